use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::mpsc;
use tile_dispatch::geometry::{Point, Rect};
use tile_dispatch::imaging::{self, Filter};
use tile_dispatch::plan::{HARD_CEILING, plan};
use tile_dispatch::task::find_tile_size;
use tile_dispatch::{Dispatcher, config, output};

#[derive(Parser)]
#[command(name = "tile-dispatch")]
#[command(about = "Split 2-D pixel jobs into bounded, tile-aligned worker threads")]
#[command(long_about = "\
Split 2-D pixel jobs into bounded, tile-aligned worker threads

An area is cut into tiles, and tiles are merged into per-worker sub-areas
until the number of workers fits the limit. Each sub-area runs on its own
thread; if a thread cannot be created, its work runs on the calling thread.

  plan        print the worker grid for an area without running anything
  apply       filter one image tile-parallel
  batch       filter every image under a directory

Settings are read from tile-dispatch.toml in the --config directory.
Run 'tile-dispatch gen-config' for a documented template.

Set RUST_LOG=debug to see planning and worker details.")]
#[command(version)]
struct Cli {
    /// Directory containing tile-dispatch.toml
    #[arg(long, default_value = ".", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// Filter selection shared by `apply` and `batch`.
#[derive(clap::Args, Clone)]
struct FilterArgs {
    /// Filter to apply
    #[arg(long, value_enum)]
    filter: FilterKind,

    /// Blur radius in pixels
    #[arg(long, default_value_t = 2)]
    radius: u32,
}

#[derive(ValueEnum, Clone, Copy)]
enum FilterKind {
    Invert,
    Grayscale,
    Blur,
}

impl FilterArgs {
    fn filter(&self) -> Filter {
        match self.filter {
            FilterKind::Invert => Filter::Invert,
            FilterKind::Grayscale => Filter::Grayscale,
            FilterKind::Blur => Filter::BoxBlur {
                radius: self.radius,
            },
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the worker grid for an area
    Plan {
        /// Area width in pixels
        #[arg(long)]
        width: i32,
        /// Area height in pixels
        #[arg(long)]
        height: i32,
        /// Tile size as ROWSxCOLUMNS (default: derived from [tiles] config)
        #[arg(long, value_parser = parse_tile)]
        tile: Option<Point>,
        /// Most workers the task can use
        #[arg(long, default_value_t = HARD_CEILING)]
        max_workers: usize,
        /// Print the plan and its work items as JSON
        #[arg(long)]
        json: bool,
    },
    /// Filter one image
    Apply {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Filter every supported image under a directory
    Batch {
        input_dir: PathBuf,
        output_dir: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Print a stock tile-dispatch.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Plan {
            width,
            height,
            tile,
            max_workers,
            json,
        } => {
            let config = config::load_config(&cli.config)?;
            let area = Rect::from_size(height, width);
            let tile_size = tile.unwrap_or_else(|| {
                find_tile_size(area, config.tiles.max_tile_size(), config.tiles.unit_cell())
            });
            let grid = plan(
                area,
                tile_size,
                max_workers,
                config.dispatch.effective_ceiling(),
            );
            let items = grid.work_items();
            if json {
                let doc = serde_json::json!({ "plan": grid, "work_items": items });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                output::print_plan(&grid, &items);
            }
        }
        Command::Apply {
            input,
            output: output_path,
            filter,
        } => {
            let config = config::load_config(&cli.config)?;
            let (tx, rx) = mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_dispatch_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = {
                // The dispatcher holds the sender; it must be gone before the
                // printer can see the channel close.
                let dispatcher = Dispatcher::from_config(&config.dispatch).with_events(tx);
                imaging::apply_filter(
                    &input,
                    &output_path,
                    filter.filter(),
                    &config.tiles,
                    &dispatcher,
                )
            };
            if printer.join().is_err() {
                log::warn!("progress printer panicked");
            }
            let summary = result?;
            for line in output::format_run_summary(&input, &output_path, &summary) {
                println!("{}", line);
            }
        }
        Command::Batch {
            input_dir,
            output_dir,
            filter,
        } => {
            let config = config::load_config(&cli.config)?;
            let dispatcher = Dispatcher::from_config(&config.dispatch);
            let entries = imaging::batch_filter(
                &input_dir,
                &output_dir,
                filter.filter(),
                &config.tiles,
                &dispatcher,
                config::effective_batch_threads(&config.batch),
            )?;
            output::print_batch_output(&entries, &input_dir);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Parse `ROWSxCOLUMNS`, e.g. `16x32`.
fn parse_tile(s: &str) -> Result<Point, String> {
    let (v, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected ROWSxCOLUMNS, got '{s}'"))?;
    let parse = |part: &str| -> Result<i32, String> {
        match part.trim().parse::<i32>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(format!("tile dimensions must be positive integers, got '{s}'")),
        }
    };
    Ok(Point::new(parse(v)?, parse(h)?))
}
