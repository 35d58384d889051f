use clap::Parser;

use crate::{config::ConfigRegistry, error::Error};

#[derive(Parser, Debug)]
#[command(name = "nfq_impair")]
#[command(about = "Userspace packet impairment (drop, bandwidth cap, jitter) on top of NFQUEUE", long_about = None)]
pub struct Args {
    /// NFQUEUE number carrying inbound traffic (repeatable)
    #[arg(long = "inbound-queue", default_values_t = [0u16])]
    pub inbound_queues: Vec<u16>,

    /// NFQUEUE number carrying outbound traffic (repeatable)
    #[arg(long = "outbound-queue", default_values_t = [1u16])]
    pub outbound_queues: Vec<u16>,

    /// Module option as KEY=VALUE, e.g. `--set drop=on --set drop-chance=20`
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub settings: Vec<String>,

    /// Max packets pulled from the queues per tick
    #[arg(long, default_value_t = 10000)]
    pub batch_limit: usize,

    /// Do not read configuration commands from stdin
    #[arg(long)]
    pub no_console: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Writes every `--set` into the registry, stopping at the first bad one.
    pub fn apply(&self, registry: &ConfigRegistry) -> Result<(), Error> {
        for setting in &self.settings {
            registry.apply_assignment(setting)?;
        }
        Ok(())
    }

    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "nfq_impair=trace"
        } else {
            "nfq_impair=info"
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{CapConfig, DropConfig};

    #[test]
    fn defaults() {
        let args = Args::parse_from(["nfq_impair"]);
        assert_eq!(args.inbound_queues, vec![0]);
        assert_eq!(args.outbound_queues, vec![1]);
        assert!(args.settings.is_empty());
        assert_eq!(args.batch_limit, 10000);
        assert_eq!(args.log_filter(), "nfq_impair=info");
    }

    #[test]
    fn settings_reach_the_registry() {
        let args = Args::parse_from([
            "nfq_impair",
            "--inbound-queue",
            "4",
            "--inbound-queue",
            "5",
            "--set",
            "drop=on",
            "--set",
            "cap-kps=2.5",
            "-v",
        ]);
        assert_eq!(args.inbound_queues, vec![4, 5]);
        assert_eq!(args.log_filter(), "nfq_impair=trace");

        let drop = Arc::new(DropConfig::default());
        let cap = Arc::new(CapConfig::default());
        let mut registry = ConfigRegistry::new();
        registry.register(drop.clone());
        registry.register(cap.clone());

        args.apply(&registry).unwrap();
        assert!(drop.enabled.get());
        assert_eq!(cap.kps.raw(), 250);
    }

    #[test]
    fn bad_setting_is_an_error() {
        let args = Args::parse_from(["nfq_impair", "--set", "cap-kps=99"]);
        let mut registry = ConfigRegistry::new();
        registry.register(Arc::new(CapConfig::default()));
        assert!(matches!(args.apply(&registry), Err(Error::Config(_))));
    }
}
