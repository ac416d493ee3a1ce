use clap::{Parser, Subcommand};
use qroute_common::db::parser::design;
use qroute_common::util::config::Config;
use qroute_common::util::profiler::ScopedTimer;
use qroute_common::util::{check, generator, logger, visualization};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Route the design file and verify the result.
    Route {
        /// Overrides `input.design_file`.
        #[arg(long)]
        design: Option<String>,
    },
    /// Verify a routed output file against its design.
    Check {
        #[arg(long)]
        design: Option<String>,
        /// Defaults to `input.output_file`.
        #[arg(long)]
        routed: Option<String>,
    },
    /// Write a random benchmark design.
    Generate {
        #[arg(long, default_value_t = 16)]
        components: usize,
        #[arg(long, default_value_t = 12)]
        routes: usize,
        #[arg(long, default_value = "inputs/random.toml")]
        output: String,
    },
}

fn main() -> anyhow::Result<()> {
    logger::init();
    let args = Args::parse();

    let config = if args.config.exists() {
        log::info!("Loading configuration from {:?}", args.config);
        let config_str = std::fs::read_to_string(&args.config)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;
        toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config TOML: {}", e))?
    } else {
        log::warn!(
            "Configuration file {:?} not found. Using internal defaults.",
            args.config
        );
        Config::default()
    };

    let command = args.command.unwrap_or(Commands::Route { design: None });

    match command {
        Commands::Generate {
            components,
            routes,
            output,
        } => {
            prepare_output_dir(&output)?;
            log::info!(
                "Generating random benchmark (Components: {}, Routes: {})...",
                components,
                routes
            );
            generator::generate_random_design(&output, components, routes)?;
            log::info!("Generated: {}", output);
        }
        Commands::Route { design } => {
            let design_file = design.unwrap_or_else(|| config.input.design_file.clone());
            if !Path::new(&design_file).exists() {
                return Err(anyhow::anyhow!("Input design file missing: {}", design_file));
            }
            prepare_output_dir(&config.input.output_file)?;
            if run_routing(&config, &design_file).is_err() {
                std::process::exit(1);
            }
        }
        Commands::Check { design, routed } => {
            let design_file = design.unwrap_or_else(|| config.input.design_file.clone());
            let routed_file = routed.unwrap_or_else(|| config.input.output_file.clone());
            let mut db = design::parse(&design_file)
                .map_err(|e| anyhow::anyhow!("Invalid design in '{}': {}", design_file, e))?;
            let attached = design::read_routed(&mut db, &routed_file)
                .map_err(|e| anyhow::anyhow!("Invalid routed file '{}': {}", routed_file, e))?;
            log::info!(
                "Loaded {} components, {} routes ({} traces)",
                db.num_components(),
                db.num_routes(),
                attached
            );
            if check::run(&db, config.routing.length_tolerance).is_err() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn prepare_output_dir(path_str: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path_str).parent() {
        if !parent.exists() && !parent.as_os_str().is_empty() {
            log::info!("Creating output directory: {:?}", parent);
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn run_routing(config: &Config, design_file: &str) -> anyhow::Result<()> {
    let _timer = ScopedTimer::new("Total flow");
    log::info!("Parsing design: {}", design_file);
    let mut db = design::parse(design_file)
        .map_err(|e| anyhow::anyhow!("Invalid design in '{}': {}", design_file, e))?;

    let summary = qroute_router::route(&mut db, config).map_err(|e| anyhow::anyhow!(e))?;
    log::info!(
        "{} routed, {} with warnings, {} failed",
        summary.routed,
        summary.warnings,
        summary.failed
    );

    log::info!("Writing routed design to {}", config.input.output_file);
    design::write_routed(&db, &config.input.output_file)?;

    if let Some(image_file) = &config.input.image_file {
        prepare_output_dir(image_file)?;
        log::info!("Generating routed visualization...");
        if let Err(e) = visualization::draw_routed_design(&db, image_file, 2000) {
            log::warn!("Could not render {}: {}", image_file, e);
        }
    }

    check::run(&db, config.routing.length_tolerance)
        .map_err(|e| anyhow::anyhow!("Verification Failed: {}", e))?;
    Ok(())
}
