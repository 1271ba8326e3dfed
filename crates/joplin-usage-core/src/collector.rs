use crate::api::{DataApi, Page, RESOURCE_FIELDS};
use crate::model::Resource;
use anyhow::{bail, Context as _, Result};

/// Drains a page-numbered listing starting at page 1 until `has_more` is false.
///
/// Any failed page aborts the whole collection. A page that claims more data
/// but carries no items is treated as a protocol error rather than looping.
pub fn collect_pages<T, F>(page_size: usize, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(usize, usize) -> Result<Page<T>>,
{
    if page_size == 0 {
        bail!("page size must be positive");
    }

    let mut out = Vec::new();
    let mut page = 1usize;
    loop {
        let Page { items, has_more } =
            fetch(page, page_size).with_context(|| format!("fetch page {page}"))?;
        tracing::debug!(page, items = items.len(), has_more, "page fetched");

        if has_more && items.is_empty() {
            bail!("page {page} reported more data but returned no items");
        }

        out.extend(items);
        if !has_more {
            return Ok(out);
        }
        page += 1;
    }
}

pub fn collect_resources<A: DataApi + ?Sized>(api: &A, page_size: usize) -> Result<Vec<Resource>> {
    collect_pages(page_size, |page, size| {
        api.list_resources(page, size, RESOURCE_FIELDS)
    })
    .context("list resources")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiOperation, MemoryDataApi};

    fn api_with_resources(count: usize) -> MemoryDataApi {
        let mut api = MemoryDataApi::new();
        for ix in 0..count {
            api = api.with_resource(&format!("r{ix:03}"), &format!("file-{ix}"), ix as u64);
        }
        api
    }

    #[test]
    fn collects_250_resources_in_three_pages() {
        let api = api_with_resources(250);

        let resources = collect_resources(&api, 100).expect("collect");

        assert_eq!(resources.len(), 250);
        assert_eq!(api.count_calls(ApiOperation::ListResources), 3);
        let ids = resources.iter().map(|r| r.id.clone()).collect::<Vec<_>>();
        let expected = (0..250).map(|ix| format!("r{ix:03}")).collect::<Vec<_>>();
        assert_eq!(ids, expected);
    }

    #[test]
    fn empty_store_takes_one_request() {
        let api = api_with_resources(0);
        let resources = collect_resources(&api, 100).expect("collect");
        assert!(resources.is_empty());
        assert_eq!(api.count_calls(ApiOperation::ListResources), 1);
    }

    #[test]
    fn failed_page_propagates() {
        let api = api_with_resources(250).fail_on(ApiOperation::ListResources, 1);
        let err = collect_resources(&api, 100).expect_err("second page fails");
        assert!(format!("{err:#}").contains("fetch page 2"));
        assert_eq!(api.count_calls(ApiOperation::ListResources), 2);
    }

    #[test]
    fn empty_page_with_has_more_is_rejected() {
        let result = collect_pages::<u32, _>(10, |_, _| {
            Ok(Page {
                items: Vec::new(),
                has_more: true,
            })
        });
        assert!(result.is_err());
    }

    #[test]
    fn requests_increasing_page_numbers_with_fixed_size() {
        let mut seen = Vec::new();
        let items = collect_pages(2, |page, size| {
            seen.push((page, size));
            Ok(Page {
                items: vec![page; size],
                has_more: page < 3,
            })
        })
        .expect("collect");

        assert_eq!(seen, vec![(1, 2), (2, 2), (3, 2)]);
        assert_eq!(items, vec![1, 1, 2, 2, 3, 3]);
    }
}
