//! Command line interface.
//!
//! Arguments mirror the config file keys; anything given here overrides the
//! file. The action flags are mutually exclusive.

use crate::config::Config;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "linak-controller",
    about = "Control a Linak-based standing desk over BLE, locally or through a network relay",
    group(ArgGroup::new("action").multiple(false))
)]
pub struct Cli {
    /// Mac address of the desk
    #[arg(long)]
    pub mac_address: Option<String>,

    /// Height of the tabletop above ground at the lowest position (mm)
    #[arg(long)]
    pub base_height: Option<i32>,

    /// How far above base-height the desk can extend (mm)
    #[arg(long)]
    pub movement_range: Option<i32>,

    /// The bluetooth adapter device name
    #[arg(long = "adapter")]
    pub adapter_name: Option<String>,

    /// The timeout for bluetooth scan (seconds)
    #[arg(long)]
    pub scan_timeout: Option<u64>,

    /// The timeout for bluetooth connection (seconds)
    #[arg(long)]
    pub connection_timeout: Option<u64>,

    /// The timeout for waiting for the desk to reach the specified height (seconds)
    #[arg(long)]
    pub movement_timeout: Option<u64>,

    /// Consecutive zero-speed readings before a move counts as stalled (0 disables)
    #[arg(long)]
    pub stall_limit: Option<u32>,

    /// The address the server should run at
    #[arg(long)]
    pub server_address: Option<String>,

    /// The port the server should run on
    #[arg(long)]
    pub server_port: Option<u16>,

    /// File path to the config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Forward any commands to a server
    #[arg(long)]
    pub forward: bool,

    /// Print debug information
    #[arg(long)]
    pub debug: bool,

    /// Watch for changes to desk height and speed and print them
    #[arg(long, group = "action")]
    pub watch: bool,

    /// Move desk to specified height (mm) or to a favourite position
    #[arg(long, group = "action", value_name = "HEIGHT")]
    pub move_to: Option<String>,

    /// Scan for devices using the configured adapter
    #[arg(long, group = "action")]
    pub scan: bool,

    /// Run as a server to accept forwarded commands
    #[arg(long, group = "action")]
    pub server: bool,

    /// Run as a simple TCP server to accept forwarded commands
    #[arg(long, group = "action")]
    pub tcp_server: bool,
}

impl Cli {
    /// Fold the arguments that were actually given over the configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(v) = &self.mac_address {
            config.mac_address = v.clone();
        }
        if let Some(v) = self.base_height {
            config.base_height = v;
        }
        if let Some(v) = self.movement_range {
            config.movement_range = v;
        }
        if let Some(v) = &self.adapter_name {
            config.adapter_name = v.clone();
        }
        if let Some(v) = self.scan_timeout {
            config.scan_timeout = v;
        }
        if let Some(v) = self.connection_timeout {
            config.connection_timeout = v;
        }
        if let Some(v) = self.movement_timeout {
            config.movement_timeout = v;
        }
        if let Some(v) = self.stall_limit {
            config.stall_limit = v;
        }
        if let Some(v) = &self.server_address {
            config.server_address = v.clone();
        }
        if let Some(v) = self.server_port {
            config.server_port = v;
        }
        if let Some(v) = &self.move_to {
            config.move_to = Some(v.clone());
        }
        config.watch |= self.watch;
        config.scan |= self.scan;
        config.server |= self.server;
        config.tcp_server |= self.tcp_server;
        config.forward |= self.forward;
        config.debug |= self.debug;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Action;

    #[test]
    fn action_flags_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["linak-controller", "--watch", "--scan"]).is_err());
        assert!(Cli::try_parse_from(["linak-controller", "--server", "--move-to", "100"]).is_err());
    }

    #[test]
    fn forward_combines_with_move_to() {
        let cli =
            Cli::try_parse_from(["linak-controller", "--forward", "--move-to", "100"]).unwrap();
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.action(), Action::Forward);
        assert_eq!(config.move_to.as_deref(), Some("100"));
    }

    #[test]
    fn arguments_override_config() {
        let cli = Cli::try_parse_from([
            "linak-controller",
            "--mac-address",
            "aa:bb:cc:dd:ee:ff",
            "--base-height",
            "600",
            "--adapter",
            "hci1",
        ])
        .unwrap();
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.mac_address, "aa:bb:cc:dd:ee:ff");
        assert_eq!(config.base_height, 600);
        assert_eq!(config.adapter_name, "hci1");
        // Untouched options keep their previous values.
        assert_eq!(config.scan_timeout, 5);
    }
}
