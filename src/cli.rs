use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "frapp8s",
    version,
    about = "Prometheus exporter for Frappe SQL query activity"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,
}
