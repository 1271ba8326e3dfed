use anyhow::{bail, Context as _, Result};
use joplin_usage_core::api::{MemoryDataApi, ResourceLink, StoreSnapshot};
use joplin_usage_core::engine::{build_report, ReportOptions};
use joplin_usage_core::model::{Note, Notebook, Resource};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use sysinfo::{Pid, System};

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(cmd) = args.next() else {
        print_help();
        return Ok(());
    };

    match cmd.as_str() {
        "gen-fixture" => cmd_gen_fixture(args.collect()),
        "perf" => cmd_perf(args.collect()),
        "help" | "-h" | "--help" => {
            print_help();
            Ok(())
        }
        other => {
            print_help();
            bail!("unknown xtask command: {other}");
        }
    }
}

fn print_help() {
    eprintln!(
        r#"xtask (joplin-usage)

Commands:
  gen-fixture  Generate a synthetic store snapshot (JSON)
  perf         Time report building over a snapshot (collect/resolve/render)

Examples:
  cargo run -p xtask -- gen-fixture --out store.json --resources 20000 --notebooks 50
  cargo run -p xtask -- perf --fixture store.json --concurrency 8 --iterations 5
  cargo run -p xtask -- perf --resources 5000
"#
    );
}

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u64(&mut self) -> u64 {
        // splitmix64
        self.0 = self.0.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn gen_range_usize(&mut self, max_exclusive: usize) -> usize {
        if max_exclusive == 0 {
            return 0;
        }
        (self.next_u64() as usize) % max_exclusive
    }

    fn gen_bool_percent(&mut self, percent: u32) -> bool {
        (self.next_u32() % 100) < percent
    }
}

struct FixtureArgs {
    resources: usize,
    notebooks: usize,
    notes: usize,
    seed: u64,
    max_size_bytes: u64,
    orphan_percent: u32,
    max_links: usize,
}

impl Default for FixtureArgs {
    fn default() -> Self {
        Self {
            resources: 10_000,
            notebooks: 40,
            notes: 4_000,
            seed: 1,
            max_size_bytes: 8 * 1_048_576,
            orphan_percent: 10,
            max_links: 3,
        }
    }
}

fn cmd_gen_fixture(args: Vec<String>) -> Result<()> {
    let mut out: Option<PathBuf> = None;
    let mut fixture = FixtureArgs::default();

    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--out" => out = Some(PathBuf::from(it.next().context("--out requires a value")?)),
            other => {
                if !parse_fixture_arg(&mut fixture, other, &mut it)? {
                    bail!("unknown gen-fixture arg: {other}");
                }
            }
        }
    }
    let out = out.unwrap_or_else(|| PathBuf::from("joplin-usage-fixture.json"));

    let started = Instant::now();
    let snapshot = gen_snapshot(&fixture);
    let gen_ms = started.elapsed().as_millis();

    let json = serde_json::to_string_pretty(&snapshot)?;
    fs::write(&out, json).with_context(|| format!("write: {}", out.display()))?;

    eprintln!(
        "gen-fixture: done\n  out: {}\n  resources: {}\n  notes: {}\n  notebooks: {}\n  links: {}\n  time_ms: {}",
        out.display(),
        snapshot.resources.len(),
        snapshot.notes.len(),
        snapshot.notebooks.len(),
        snapshot.links.len(),
        gen_ms
    );
    Ok(())
}

/// Returns `Ok(false)` when `arg` is not a fixture flag.
fn parse_fixture_arg(
    fixture: &mut FixtureArgs,
    arg: &str,
    it: &mut impl Iterator<Item = String>,
) -> Result<bool> {
    let mut value = |name: &str| -> Result<String> {
        it.next().with_context(|| format!("{name} requires a value"))
    };
    match arg {
        "--resources" => fixture.resources = value(arg)?.parse()?,
        "--notebooks" => fixture.notebooks = value(arg)?.parse::<usize>()?.max(1),
        "--notes" => fixture.notes = value(arg)?.parse::<usize>()?.max(1),
        "--seed" => fixture.seed = value(arg)?.parse()?,
        "--max-size" => fixture.max_size_bytes = value(arg)?.parse()?,
        "--orphan-percent" => fixture.orphan_percent = value(arg)?.parse()?,
        "--max-links" => fixture.max_links = value(arg)?.parse::<usize>()?.max(1),
        _ => return Ok(false),
    }
    Ok(true)
}

fn gen_snapshot(args: &FixtureArgs) -> StoreSnapshot {
    let mut rng = Rng::new(args.seed);

    let notebooks = (0..args.notebooks)
        .map(|ix| Notebook::new(format!("f{ix:04}"), format!("Notebook {ix:04}")))
        .collect::<Vec<_>>();

    let notes = (0..args.notes)
        .map(|ix| {
            let notebook = &notebooks[gen_skewed(&mut rng, notebooks.len())];
            Note::new(format!("n{ix:06}"), format!("Note {ix:06}"), notebook.id.clone())
        })
        .collect::<Vec<_>>();

    let mut resources = Vec::with_capacity(args.resources);
    let mut links = Vec::new();
    for ix in 0..args.resources {
        let id = format!("r{ix:06}");
        let size = (rng.next_u64() % args.max_size_bytes.max(1)) + 1;
        // Some resources carry no title so the "Untitled" path gets exercised.
        let title = if rng.gen_bool_percent(5) {
            String::new()
        } else {
            format!("attachment-{ix:06}.bin")
        };
        resources.push(Resource::new(id.clone(), title, size));

        if rng.gen_bool_percent(args.orphan_percent) {
            continue;
        }
        let link_count = 1 + rng.gen_range_usize(args.max_links);
        for _ in 0..link_count {
            let note = &notes[rng.gen_range_usize(notes.len())];
            links.push(ResourceLink {
                resource_id: id.clone(),
                note_id: note.id.clone(),
            });
        }
    }

    StoreSnapshot {
        current_notebook: notebooks.first().map(|notebook| notebook.id.clone()),
        notebooks,
        notes,
        resources,
        links,
    }
}

/// Biased toward low indexes so a few notebooks end up much larger.
fn gen_skewed(rng: &mut Rng, len: usize) -> usize {
    let mut ix = 0usize;
    while ix + 1 < len && (rng.next_u32() & 0b11) == 0 {
        ix += 1;
    }
    if rng.gen_bool_percent(50) {
        rng.gen_range_usize(len)
    } else {
        ix
    }
}

struct PerfArgs {
    fixture: Option<PathBuf>,
    generated: FixtureArgs,
    concurrency: usize,
    iterations: usize,
}

fn cmd_perf(args: Vec<String>) -> Result<()> {
    let args = parse_perf_args(args)?;

    let load_start = Instant::now();
    let snapshot = match &args.fixture {
        Some(path) => {
            let raw =
                fs::read_to_string(path).with_context(|| format!("read: {}", path.display()))?;
            serde_json::from_str::<StoreSnapshot>(&raw)
                .with_context(|| format!("parse fixture: {}", path.display()))?
        }
        None => gen_snapshot(&args.generated),
    };
    let load_ms = load_start.elapsed().as_millis();
    let resource_count = snapshot.resources.len();
    let link_count = snapshot.links.len();

    let options = ReportOptions {
        linkage_concurrency: args.concurrency,
        ..ReportOptions::default()
    };

    let mut build_samples = Vec::with_capacity(args.iterations);
    let mut last = None;
    for _ in 0..args.iterations {
        let api = MemoryDataApi::from_snapshot(snapshot.clone());
        let started = Instant::now();
        let built = build_report(&api, &options)?;
        build_samples.push(started.elapsed().as_millis());
        last = Some(built);
    }
    let Some(built) = last else {
        bail!("perf ran zero iterations");
    };

    println!("perf:");
    match &args.fixture {
        Some(path) => println!("  fixture: {}", path.display()),
        None => println!("  fixture: generated (seed {})", args.generated.seed),
    }
    println!("  load_ms: {load_ms}");
    println!("  resources: {resource_count}");
    println!("  links: {link_count}");
    println!("  concurrency: {}", args.concurrency);
    println!("  link_entries: {}", built.stats.link_entries);
    println!("  orphaned_resources: {}", built.stats.orphaned_resources);
    println!("  notebooks: {}", built.stats.notebooks);
    println!("  notebook_fetches: {}", built.stats.notebook_fetches);
    println!("  notebook_cache_hits: {}", built.stats.notebook_cache_hits);
    println!("  report_bytes: {}", built.body.len());
    println!("  build_samples: {}", build_samples.len());
    println!("  build_p50_ms: {}", percentile_ms(&build_samples, 50.0));
    println!("  build_p95_ms: {}", percentile_ms(&build_samples, 95.0));
    if let Some((rss_kb, vmem_kb)) = current_process_memory_kb() {
        println!("  rss_kb: {rss_kb}");
        println!("  vmem_kb: {vmem_kb}");
    } else {
        println!("  rss_kb: N/A");
        println!("  vmem_kb: N/A");
    }

    Ok(())
}

fn parse_perf_args(args: Vec<String>) -> Result<PerfArgs> {
    let mut fixture: Option<PathBuf> = None;
    let mut generated = FixtureArgs::default();
    let mut concurrency: usize = 1;
    let mut iterations: usize = 5;

    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--fixture" => {
                fixture = Some(PathBuf::from(
                    it.next().context("--fixture requires a value")?,
                ))
            }
            "--concurrency" => {
                let raw = it.next().context("--concurrency requires a value")?;
                concurrency = raw
                    .parse::<usize>()
                    .with_context(|| format!("invalid --concurrency: {raw}"))?;
            }
            "--iterations" => {
                let raw = it.next().context("--iterations requires a value")?;
                iterations = raw
                    .parse::<usize>()
                    .with_context(|| format!("invalid --iterations: {raw}"))?;
            }
            other => {
                if !parse_fixture_arg(&mut generated, other, &mut it)? {
                    bail!("unknown perf arg: {other}");
                }
            }
        }
    }

    Ok(PerfArgs {
        fixture,
        generated,
        concurrency: concurrency.max(1),
        iterations: iterations.max(1),
    })
}

fn percentile_ms(samples: &[u128], percentile: f64) -> u128 {
    if samples.is_empty() {
        return 0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();

    let rank = ((percentile / 100.0) * ((sorted.len() - 1) as f64)).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

fn current_process_memory_kb() -> Option<(u64, u64)> {
    let mut system = System::new();
    system.refresh_processes();
    let pid = Pid::from_u32(std::process::id());
    let process = system.process(pid)?;
    Some((process.memory(), process.virtual_memory()))
}
