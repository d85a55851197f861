//! zx0pack CLI - compress files into the ZX0 bitstream format.

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use zx0pack::{BLOCK_SIZE, Zx0Compressor, Zx0Config, Zx0Stats};

#[derive(Parser)]
#[command(name = "zx0pack")]
#[command(author, version, about = "ZX0 compressor with a near-optimal parser")]
#[command(long_about = "
Compresses a file into the ZX0 bitstream format used by 8-bit depackers.

Examples:
  zx0pack game.bin
  zx0pack game.bin game.zx0
  zx0pack --classic loader.bin
  zx0pack --max-window 2048 sprites.bin
  zx0pack --dictionary level1.bin level2.bin
")]
struct Cli {
    /// File to compress
    input: PathBuf,

    /// Output file (defaults to INPUT.zx0)
    output: Option<PathBuf>,

    /// Emit the classic V1 bit order instead of V2
    #[arg(short, long)]
    classic: bool,

    /// Maximum back-reference distance
    #[arg(short = 'w', long, value_name = "BYTES")]
    max_window: Option<usize>,

    /// Pre-seed the window with the contents of this file
    #[arg(short, long, value_name = "FILE")]
    dictionary: Option<PathBuf>,

    /// Overwrite the output file if it exists
    #[arg(short, long)]
    force: bool,

    /// Print compression statistics
    #[arg(short, long)]
    stats: bool,

    /// Print statistics as JSON (implies --stats)
    #[arg(long)]
    json: bool,

    /// Suppress the progress bar
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("zx0pack: error: {}", err);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.input));
    if output.exists() && !cli.force {
        return Err(format!("{} already exists (use --force to overwrite)", output.display()).into());
    }

    let mut config = if cli.classic {
        Zx0Config::CLASSIC
    } else {
        Zx0Config::V2
    };
    if let Some(window) = cli.max_window {
        config = config.with_max_window(window);
    }

    // Dictionary mode: the dictionary bytes lead the input buffer as
    // pre-seeded context and are not part of the emitted stream.
    let mut data = Vec::new();
    if let Some(dict_path) = &cli.dictionary {
        let dict = std::fs::read(dict_path)?;
        config = config.with_dictionary(dict.len());
        data = dict;
    }
    let payload_len = {
        let input = std::fs::read(&cli.input)?;
        data.extend_from_slice(&input);
        input.len()
    };

    let bar = progress_bar(cli, payload_len);
    let mut compressor = Zx0Compressor::new(config);
    let packed = compressor.compress_with_progress(&data, |p| {
        if let Some(bar) = &bar {
            bar.set_position(p.processed as u64);
        }
    })?;
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    std::fs::write(&output, &packed)?;

    if cli.json {
        println!("{}", stats_json(&output, compressor.stats()));
    } else {
        let ratio = if payload_len > 0 {
            100.0 * packed.len() as f64 / payload_len as f64
        } else {
            100.0
        };
        println!(
            "{} -> {} ({} -> {} bytes, {:.1}%)",
            cli.input.display(),
            output.display(),
            payload_len,
            packed.len(),
            ratio
        );
        if cli.stats {
            print_stats(compressor.stats());
        }
    }
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(".zx0");
    PathBuf::from(name)
}

fn progress_bar(cli: &Cli, payload_len: usize) -> Option<ProgressBar> {
    if cli.quiet || payload_len <= BLOCK_SIZE {
        return None;
    }
    let bar = ProgressBar::new(payload_len as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes} ({eta})")
            .expect("valid progress template"),
    );
    Some(bar)
}

fn print_stats(stats: &Zx0Stats) {
    println!("commands:       {}", stats.commands);
    println!("rep matches:    {}", stats.rep_matches);
    println!(
        "literal runs:   {} (min {}, max {}, mean {:.1})",
        stats.literal_runs.count,
        stats.literal_runs.min,
        stats.literal_runs.max,
        stats.literal_runs.mean()
    );
    println!(
        "offsets:        {} (min {}, max {}, mean {:.1})",
        stats.offsets.count,
        stats.offsets.min,
        stats.offsets.max,
        stats.offsets.mean()
    );
    println!(
        "match lengths:  {} (min {}, max {}, mean {:.1})",
        stats.match_lens.count,
        stats.match_lens.min,
        stats.match_lens.max,
        stats.match_lens.mean()
    );
    println!(
        "input runs:     {} (min {}, max {}, mean {:.1})",
        stats.rle_runs.count,
        stats.rle_runs.min,
        stats.rle_runs.max,
        stats.rle_runs.mean()
    );
    println!("safe distance:  {}", stats.safe_distance);
}

fn stats_json(output: &Path, stats: &Zx0Stats) -> String {
    serde_json::json!({
        "output": output.display().to_string(),
        "input_size": stats.input_size,
        "output_size": stats.output_size,
        "commands": stats.commands,
        "rep_matches": stats.rep_matches,
        "safe_distance": stats.safe_distance,
        "literal_runs": summary_json(&stats.literal_runs),
        "offsets": summary_json(&stats.offsets),
        "match_lens": summary_json(&stats.match_lens),
        "rle_runs": summary_json(&stats.rle_runs),
    })
    .to_string()
}

fn summary_json(summary: &zx0pack::Summary) -> serde_json::Value {
    serde_json::json!({
        "count": summary.count,
        "min": summary.min,
        "max": summary.max,
        "mean": summary.mean(),
    })
}
