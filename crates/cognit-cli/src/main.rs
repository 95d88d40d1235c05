//! The Cognit device runtime command-line harness.

use std::path::PathBuf;

use clap::Parser;
use clap::ValueEnum;
use clap_verbosity_flag::Verbosity;
use cognit_core::Config;
use cognit_core::DeviceRuntime;
use cognit_core::Geolocation;
use cognit_core::Language;
use cognit_core::Requirements;
use tracing_log::AsTrace;

/// Registers one function and invokes it once, for exercising the runtime
/// end to end against a live Cognit Frontend.
#[derive(Debug, Parser)]
#[command(name = "cognit-cli")]
struct Cli {
    #[command(flatten)]
    verbosity: Verbosity,

    /// Path to an optional TOML configuration file, overlaid by
    /// `COGNIT_*` environment variables.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target runtime image tag.
    #[arg(long)]
    flavour: Option<String>,

    /// Maximum acceptable cluster latency, in milliseconds. Requires
    /// `--geolocation`.
    #[arg(long)]
    max_latency: Option<u64>,

    /// Free-form geolocation label.
    #[arg(long)]
    geolocation: Option<String>,

    /// The language the registered function body targets.
    #[arg(long, value_enum, default_value_t = LanguageArg::Py)]
    language: LanguageArg,

    /// The function's compiled/source body, as a string.
    #[arg(long)]
    body: String,

    /// JSON-encoded parameters passed to the function, in order.
    #[arg(long = "param")]
    params: Vec<String>,
}

/// Command-line mirror of [`cognit_core::Language`].
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LanguageArg {
    /// Python.
    Py,
    /// C.
    C,
}

impl From<LanguageArg> for Language {
    fn from(value: LanguageArg) -> Self {
        match value {
            LanguageArg::Py => Language::Py,
            LanguageArg::C => Language::C,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_max_level(cli.verbosity.log_level_filter().as_trace())
        .with_writer(std::io::stderr)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("global subscriber is set exactly once");

    if let Err(e) = real_main(cli).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

/// The actual main logic, kept separate from `main` so errors can be
/// reported uniformly instead of via a panic.
async fn real_main(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let runtime = DeviceRuntime::new(config);

    let requirements = Requirements {
        flavour: cli.flavour,
        geolocation: cli.geolocation.map(Geolocation::Label),
        max_latency: cli.max_latency,
        max_function_execution_time: None,
        min_energy_renewable_usage: None,
    };
    requirements.validate()?;
    runtime.init(requirements)?;

    let params = cli
        .params
        .iter()
        .map(|p| serde_json::from_str(p))
        .collect::<Result<Vec<_>, _>>()?;
    let function = runtime.register_function(cli.language.into(), cli.body);
    let response = runtime.call(function, params, None).await;

    println!("{}", serde_json::to_string_pretty(&response)?);
    runtime.stop().await?;

    Ok(())
}
