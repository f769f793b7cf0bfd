//! Service configuration
//!
//! Loaded from a YAML file merged with `LINKSRV_`-prefixed environment
//! variables. Every knob has a default matching the bench setup, so an empty
//! file is a valid configuration.

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Top-level configuration for the link service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LinkConfig {
    pub service: ServiceConfig,
    pub host_link: HostLinkConfig,
    pub modbus: ModbusConfig,
    pub vfd: VfdConfig,
    pub watchdog: WatchdogConfig,
    pub diag: DiagConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Service name, used for log file naming
    pub name: String,
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "linksrv".to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Optional log directory; daily-rotated files when set
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

/// The serial link toward the host application.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostLinkConfig {
    pub device: String,
    pub baud_rate: u32,
}

impl Default for HostLinkConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
        }
    }
}

/// The RS-485 bus toward the drives.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModbusConfig {
    pub device: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    /// "none", "even" or "odd"
    pub parity: String,
    /// How long the drives take to prepare a response
    pub response_delay_ms: u64,
    /// True when the transceiver wiring echoes transmitted bytes back into
    /// the receiver
    pub echo: bool,
    /// Replace the serial bus with an in-process simulated drive bank
    pub simulate: bool,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 38_400,
            data_bits: 8,
            stop_bits: 2,
            parity: "none".to_string(),
            response_delay_ms: 6,
            echo: true,
            simulate: false,
        }
    }
}

impl ModbusConfig {
    /// Symbols per byte for the configured framing: start bit, data bits,
    /// stop bits.
    pub fn symbols_per_byte(&self) -> u32 {
        1 + self.data_bits as u32
            + self.stop_bits as u32
            + if self.parity == "none" { 0 } else { 1 }
    }
}

/// Drive addressing and register map.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VfdConfig {
    /// Sequential node addresses 0..nodes, where 0 is broadcast
    pub nodes: u8,
    /// Base of the status register block
    pub status_register: u16,
    /// Registers in the status block
    pub status_register_count: u16,
    /// Frequency setpoint register (drive parameter 9.26)
    pub frequency_register: u16,
}

impl Default for VfdConfig {
    fn default() -> Self {
        Self {
            nodes: 3,
            status_register: 0x2100,
            status_register_count: 8,
            frequency_register: 0x091A,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchdogConfig {
    /// Ticks (milliseconds) allowed between kicks before a task is reported
    pub timeout_ticks: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout_ticks: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiagConfig {
    /// Attach the diagnostic funnel to the service log; when false the
    /// funnel short-circuits
    pub enabled: bool,
    /// Per-packet I/O summaries and counters on the diagnostic sink
    pub verbose_io: bool,
}

impl Default for DiagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            verbose_io: true,
        }
    }
}

impl LinkConfig {
    /// Load configuration from a YAML file plus environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: LinkConfig = Figment::from(Serialized::defaults(LinkConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("LINKSRV_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        use crate::error::LinkSrvError;

        if self.vfd.nodes == 0 {
            return Err(LinkSrvError::config("vfd.nodes must be at least 1"));
        }
        if self.vfd.status_register_count == 0 || self.vfd.status_register_count > 125 {
            return Err(LinkSrvError::config(
                "vfd.status_register_count must be between 1 and 125",
            ));
        }
        if self.modbus.baud_rate == 0 || self.host_link.baud_rate == 0 {
            return Err(LinkSrvError::config("baud_rate must be non-zero"));
        }
        if self.watchdog.timeout_ticks == 0 {
            return Err(LinkSrvError::config("watchdog.timeout_ticks must be non-zero"));
        }
        match self.modbus.parity.as_str() {
            "none" | "even" | "odd" => {}
            other => {
                return Err(LinkSrvError::config(format!(
                    "unknown parity {other:?} (expected none, even or odd)"
                )))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_bench_setup() {
        let config = LinkConfig::default();
        assert_eq!(config.modbus.baud_rate, 38_400);
        assert_eq!(config.modbus.symbols_per_byte(), 11);
        assert_eq!(config.vfd.frequency_register, 0x091A);
        assert_eq!(config.watchdog.timeout_ticks, 2000);
        config.validate().unwrap();
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("linksrv.yaml");
        std::fs::write(
            &path,
            r#"
modbus:
  simulate: true
  echo: false
vfd:
  nodes: 6
"#,
        )
        .unwrap();

        let config = LinkConfig::load(&path).unwrap();
        assert!(config.modbus.simulate);
        assert!(!config.modbus.echo);
        assert_eq!(config.vfd.nodes, 6);
        // Untouched keys keep defaults.
        assert_eq!(config.modbus.response_delay_ms, 6);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("linksrv.yaml");
        std::fs::write(&path, "vfd:\n  nodes: 0\n").unwrap();
        assert!(LinkConfig::load(&path).is_err());

        let path = dir.path().join("parity.yaml");
        std::fs::write(&path, "modbus:\n  parity: mark\n").unwrap();
        assert!(LinkConfig::load(&path).is_err());
    }
}
