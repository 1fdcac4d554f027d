use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use apiscope_container::{CollectingVisitor, TypeContainer};
use apiscope_core::{StructureBuilder, TypeOrigin};
use apiscope_registry::description::ElementDescriptor;
use apiscope_registry::{Baseline, ModelConfig, ModelContext, Module};

mod report;

#[derive(Parser)]
#[command(name = "apiscope")]
#[command(about = "Inspect class files, module API surfaces and baseline package resolution", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Model configuration file (TOML)
    #[arg(short, long, env = "APISCOPE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the structure of one type
    Inspect {
        /// A `.class` file, or a module location when --type is given
        path: PathBuf,

        /// Fully qualified type name to look up in the module
        #[arg(short, long = "type")]
        type_name: Option<String>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List a module's packages with their API visibility
    Packages {
        /// Bundle jar or directory
        location: PathBuf,
    },

    /// Show which modules of a baseline supply a package
    Resolve {
        #[command(flatten)]
        source: BaselineSource,

        /// Package to resolve
        package: String,

        /// Module the package is resolved from
        #[arg(short, long)]
        from: Option<String>,

        /// Also print resolver errors of the baseline
        #[arg(long)]
        errors: bool,
    },

    /// List the types of a module
    Types {
        /// Bundle jar or directory
        location: PathBuf,

        /// Only list types of this package
        #[arg(short, long)]
        package: Option<String>,
    },
}

#[derive(clap::Args)]
#[group(required = true, multiple = false)]
struct BaselineSource {
    /// Artifact listing (maven or tycho format)
    #[arg(long)]
    listing: Option<PathBuf>,

    /// Plugins directory
    #[arg(long)]
    dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.debug)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => ModelConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => ModelConfig::default(),
    };
    let ctx = ModelContext::new(config);

    match cli.command {
        Commands::Inspect {
            path,
            type_name,
            json,
        } => handle_inspect(&ctx, &path, type_name.as_deref(), json),
        Commands::Packages { location } => handle_packages(&ctx, &location),
        Commands::Resolve {
            source,
            package,
            from,
            errors,
        } => handle_resolve(&ctx, &source, &package, from.as_deref(), errors),
        Commands::Types { location, package } => {
            handle_types(&ctx, &location, package.as_deref())
        }
    }
}

fn open_module(ctx: &Arc<ModelContext>, location: &Path) -> Result<Arc<Module>> {
    match Module::open(location, ctx)
        .with_context(|| format!("Failed to open module {}", location.display()))?
    {
        Some(module) => Ok(module),
        None => bail!("{} is not a valid module", location.display()),
    }
}

fn handle_inspect(
    ctx: &Arc<ModelContext>,
    path: &Path,
    type_name: Option<&str>,
    json: bool,
) -> Result<()> {
    let ty = match type_name {
        Some(name) => {
            let module = open_module(ctx, path)?;
            let root = module
                .find_type_root(name)
                .with_context(|| format!("Failed to search {}", module.id()))?
                .with_context(|| format!("{} not found in {}", name, module.id()))?;
            info!("Found {} at {}", name, root.location());
            let ty = root
                .structure()
                .with_context(|| format!("Failed to read {}", root.location()))?
                .with_context(|| format!("{} is not a valid class file", root.location()))?;
            module.dispose();
            ty
        }
        None => {
            let bytes =
                fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
            let module_id = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_default();
            let ty = StructureBuilder::try_build(&bytes, TypeOrigin::new("cli", module_id))
                .with_context(|| format!("Failed to decode {}", path.display()))?;
            Arc::new(ty)
        }
    };

    if json {
        let value = report::type_json(&ty);
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", report::type_text(&ty));
    }
    Ok(())
}

fn handle_packages(ctx: &Arc<ModelContext>, location: &Path) -> Result<()> {
    let module = open_module(ctx, location)?;
    let description = module
        .api_description()
        .with_context(|| format!("Failed to describe {}", module.id()))?;
    println!("{} {}", module.id(), module.version());
    if module.has_api_description()? {
        println!("  (refined by .api_description)");
    }
    for package in module.package_names()?.iter() {
        let visibility = description
            .visibility(&ElementDescriptor::package(package))
            .map(|v| v.as_str())
            .unwrap_or("PRIVATE");
        let friends = description.friends(package);
        if friends.is_empty() {
            println!("  {:<50} {}", package, visibility);
        } else {
            let friends: Vec<&str> = friends.into_iter().collect();
            println!("  {:<50} {} friends={}", package, visibility, friends.join(","));
        }
    }
    module.dispose();
    Ok(())
}

fn load_baseline(ctx: &Arc<ModelContext>, source: &BaselineSource) -> Result<Arc<Baseline>> {
    match (&source.listing, &source.dir) {
        (Some(listing), _) => Baseline::load_listing("cli", listing, ctx)
            .with_context(|| format!("Failed to load listing {}", listing.display())),
        (None, Some(dir)) => Baseline::load_directory("cli", dir, ctx)
            .with_context(|| format!("Failed to load directory {}", dir.display())),
        (None, None) => bail!("either --listing or --dir is required"),
    }
}

fn handle_resolve(
    ctx: &Arc<ModelContext>,
    source: &BaselineSource,
    package: &str,
    from: Option<&str>,
    errors: bool,
) -> Result<()> {
    let baseline = load_baseline(ctx, source)?;
    info!("Loaded baseline with {} modules", baseline.modules()?.len());
    if let Some(environment) = baseline.execution_environment()? {
        debug!("Bound execution environment {}", environment);
    }

    let origin = match from {
        Some(id) => Some(
            baseline
                .module(id)?
                .with_context(|| format!("Module {} is not in the baseline", id))?,
        ),
        None => None,
    };
    let suppliers = baseline.resolve_package(origin.as_ref(), package)?;
    if suppliers.is_empty() {
        warn!("No module supplies {}", package);
    }
    for supplier in &suppliers {
        println!("{} {} ({})", supplier.id(), supplier.version(), supplier.location().display());
    }

    if errors {
        let status = baseline.environment_status()?;
        for environment in &status.unsatisfied {
            println!("unsatisfied environment {}", environment);
        }
        for (key, error) in baseline.errors()? {
            println!("{}: {}", key, error);
        }
    }
    baseline.dispose();
    Ok(())
}

fn handle_types(ctx: &Arc<ModelContext>, location: &Path, package: Option<&str>) -> Result<()> {
    let module = open_module(ctx, location)?;
    let containers: Arc<TypeContainer> = module.type_containers()?;
    let mut visitor = CollectingVisitor::default();
    containers
        .visit(&mut visitor)
        .with_context(|| format!("Failed to list types of {}", module.id()))?;

    for root in visitor
        .roots
        .iter()
        .filter(|root| package.map_or(true, |p| root.package_name() == p))
    {
        println!("{}", root.name());
    }
    module.dispose();
    Ok(())
}
