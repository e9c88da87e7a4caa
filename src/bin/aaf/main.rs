//! AAF CLI - Tool for inspecting and re-writing AAF files.

use std::env;
use std::fs::File;
use std::io::BufReader;
use std::process::exit;
use std::time::Instant;

use aaf::cfb::{Container, EntryId};
use aaf::{DecodeOptions, Decoder, EncodeOptions, Encoder, Item, SerializableObject, Timeline};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "info";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            _ => filtered_args.push(arg),
        }
    }
    init_logging(level);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let need = |n: usize, usage: &str| {
        if filtered_args.len() < n {
            eprintln!("Error: missing argument");
            eprintln!("Usage: aaf-cli {usage}");
            exit(1);
        }
    };

    match filtered_args[0] {
        "info" | "i" => {
            need(2, "info <file.aaf>");
            cmd_info(filtered_args[1]);
        }
        "tree" | "t" => {
            need(2, "tree <file.aaf>");
            cmd_tree(filtered_args[1]);
        }
        "timeline" | "tl" => {
            need(2, "timeline <file.aaf> [--simplify]");
            cmd_timeline(filtered_args[1], filtered_args.contains(&"--simplify"));
        }
        "json" | "j" => {
            need(2, "json <file.aaf>");
            cmd_json(filtered_args[1]);
        }
        "roundtrip" | "rt" => {
            need(3, "roundtrip <in.aaf> <out.aaf> [--ascii]");
            cmd_roundtrip(filtered_args[1], filtered_args[2], filtered_args.contains(&"--ascii"));
        }
        "help" | "h" | "-h" | "--help" => print_help(),
        path if path.to_lowercase().ends_with(".aaf") => cmd_info(path),
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            exit(1);
        }
    }
}

/// `RUST_LOG` wins over the verbosity flags.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_help() {
    println!("aaf-cli - AAF file toolkit");
    println!();
    println!("USAGE:");
    println!("    aaf-cli [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info      <file>               Show header, counts and compositions");
    println!("    t, tree      <file>               Show container storages and streams");
    println!("    tl, timeline <file> [--simplify]  Show tracks and items of every composition");
    println!("    j, json      <file>               Print decoded timelines as JSON");
    println!("    rt, roundtrip <in> <out> [--ascii] Decode and re-encode");
    println!("    h, help                           Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output (very verbose)");
    println!("    -q, --quiet      Only show errors");
    println!();
    println!("NOTES:");
    println!("    - Passing a .aaf file directly is equivalent to 'info'");
    println!("    - RUST_LOG overrides the verbosity flags");
}

fn fail(what: &str, path: &str, e: impl std::fmt::Display) -> ! {
    eprintln!("Failed to {what} {path}: {e}");
    exit(1);
}

fn open(path: &str) -> Decoder<BufReader<File>> {
    match File::open(path) {
        Ok(f) => Decoder::new(BufReader::new(f)),
        Err(e) => fail("open", path, e),
    }
}

fn decode_all(path: &str, opts: &DecodeOptions) -> (SerializableObject, usize) {
    let mut decoder = open(path);
    let start = Instant::now();
    let obj = match decoder.decode_with_options(opts) {
        Ok(obj) => obj,
        Err(e) => fail("decode", path, e),
    };
    debug!(elapsed = ?start.elapsed(), "decoded");
    (obj, decoder.stats().instances())
}

fn cmd_info(path: &str) {
    info!("Opening file: {path}");
    let (obj, instances) = decode_all(path, &DecodeOptions::default());

    println!("File: {path}");
    println!("Objects decoded: {instances}");
    let timelines = obj.timelines();
    println!("Compositions: {}", timelines.len());
    for tl in timelines {
        println!();
        println!("  {} @ {} fps", display_name(&tl.name), tl.rate.to_f64());
        println!("    Duration: {:.3}s", tl.duration().to_seconds());
        println!("    Video tracks: {}", tl.video_tracks().count());
        println!("    Audio tracks: {}", tl.audio_tracks().count());
        if !tl.markers.is_empty() {
            println!("    Markers: {}", tl.markers.len());
        }
    }
}

fn cmd_tree(path: &str) {
    let file = match File::open(path) {
        Ok(f) => BufReader::new(f),
        Err(e) => fail("open", path, e),
    };
    let c = match Container::open(file) {
        Ok(c) => c,
        Err(e) => fail("read", path, e),
    };
    println!("{path} ({} entries)", c.entry_count());
    print_entry(&c, c.root(), 0);
}

fn print_entry(c: &Container<'_>, id: EntryId, depth: usize) {
    let indent = "  ".repeat(depth);
    if c.is_stream(id) {
        println!("{indent}{} [{} bytes]", c.name(id), c.stream_len(id));
        return;
    }
    println!("{indent}{}/ {{{}}}", c.name(id), c.clsid(id));
    for child in c.children(id) {
        print_entry(c, child, depth + 1);
    }
}

fn cmd_timeline(path: &str, simplify: bool) {
    let opts = DecodeOptions::default().with_simplified(simplify);
    let (obj, _) = decode_all(path, &opts);
    for tl in obj.timelines() {
        print_timeline(tl);
    }
}

fn print_timeline(tl: &Timeline) {
    println!("Timeline: {}", display_name(&tl.name));
    if let Some(start) = tl.global_start_time {
        println!("  Start: {} @ {}", start.value, start.rate);
    }
    for track in &tl.tracks {
        println!("  {:?} track {} ({} items)", track.kind, display_name(&track.name), track.items.len());
        for (item, range) in track.items.iter().zip(track.item_ranges()) {
            println!(
                "    [{:>8} +{:>6}] {:<10} {}",
                range.start_time.value,
                range.duration.value,
                item.kind_name(),
                item_label(item)
            );
        }
    }
    for m in &tl.markers {
        println!("  Marker {} at {}", m.name, m.marked_range.start_time.value);
    }
}

fn item_label(item: &Item) -> String {
    match item {
        Item::Clip(c) => match &c.media_reference {
            Some(m) => format!("{} -> {}", c.name, m.name),
            None => c.name.clone(),
        },
        Item::Nested(n) => format!("{} ({} tracks)", n.name, n.tracks.len()),
        Item::Transition(t) => format!("{:?}", t.transition_type),
        Item::Opaque(o) => o.kind.clone(),
        Item::Gap(_) => String::new(),
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "<unnamed>"
    } else {
        name
    }
}

fn cmd_json(path: &str) {
    let (obj, _) = decode_all(path, &DecodeOptions::default());
    match serde_json::to_string_pretty(&obj) {
        Ok(s) => println!("{s}"),
        Err(e) => fail("serialize", path, e),
    }
}

fn cmd_roundtrip(input: &str, output: &str, ascii: bool) {
    info!("Round trip: {input} -> {output}");
    let (obj, instances) = decode_all(input, &DecodeOptions::default());
    let mut opts = EncodeOptions::default();
    if ascii {
        opts = opts.with_metadata_encoding(aaf::MetadataEncoding::Ascii);
    }
    let file = match File::create(output) {
        Ok(f) => f,
        Err(e) => fail("create", output, e),
    };
    let start = Instant::now();
    if let Err(e) = Encoder::new(file).encode_with_options(&obj, &opts) {
        fail("encode", output, e);
    }
    println!(
        "Wrote {} composition(s) from {instances} objects in {:?}",
        obj.timelines().len(),
        start.elapsed()
    );
}
