//! Command line parsing.

use std::path::PathBuf;

use anyhow::Context;
use cadence_core::BackendKind;

pub const DEFAULT_CONFIG: &str = "cadence.toml";

/// Options accepted by the sandbox binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxArgs {
    pub backend: Option<BackendKind>,
    /// Exit after this many frames.
    pub frames: Option<u64>,
    pub software: bool,
    pub config: PathBuf,
    pub help: bool,
}

impl Default for SandboxArgs {
    fn default() -> Self {
        Self {
            backend: None,
            frames: None,
            software: false,
            config: PathBuf::from(DEFAULT_CONFIG),
            help: false,
        }
    }
}

impl SandboxArgs {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::parse(std::env::args().skip(1))
    }

    pub fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => parsed.help = true,
                "--software" => parsed.software = true,
                "--backend" => {
                    let value = args.next().context("--backend needs a value")?;
                    parsed.backend = Some(value.parse()?);
                }
                "--frames" => {
                    let value = args.next().context("--frames needs a value")?;
                    parsed.frames = Some(
                        value
                            .parse()
                            .with_context(|| format!("Invalid frame count '{value}'"))?,
                    );
                }
                "--config" => {
                    parsed.config = args.next().context("--config needs a path")?.into();
                }
                other => tracing::warn!("Ignoring unknown argument '{}'", other),
            }
        }

        Ok(parsed)
    }
}

pub fn print_help() {
    eprintln!(
        "Cadence Engine Sandbox

USAGE:
    cargo run -p cadence-sandbox -- [OPTIONS]

OPTIONS:
    --backend <NAME>    Graphics backend: vulkan, d3d12 or headless
    --frames <N>        Exit after N frames (headless default: 600)
    --software          Prefer a software adapter (WARP, lavapipe)
    --config <PATH>     Configuration file (default: {DEFAULT_CONFIG})
    -h, --help          Print this help message

CONTROLS:
    Space               Pause or resume the spin
    Escape              Quit

ENVIRONMENT VARIABLES:
    RUST_LOG            Set log level (e.g., info, debug, trace)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<SandboxArgs> {
        SandboxArgs::parse(args.iter().map(|s| (*s).to_string()))
    }

    #[test]
    fn defaults_without_arguments() {
        assert_eq!(parse(&[]).unwrap(), SandboxArgs::default());
    }

    #[test]
    fn parses_all_options() {
        let args = parse(&[
            "--backend", "headless", "--frames", "30", "--software", "--config", "demo.toml",
        ])
        .unwrap();

        assert_eq!(args.backend, Some(BackendKind::Headless));
        assert_eq!(args.frames, Some(30));
        assert!(args.software);
        assert_eq!(args.config, PathBuf::from("demo.toml"));
        assert!(!args.help);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse(&["--backend", "metal"]).is_err());
        assert!(parse(&["--frames", "many"]).is_err());
        assert!(parse(&["--config"]).is_err());
    }
}
