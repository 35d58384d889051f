//! Runtime configuration shared between the console (writer) and the shaping loop (reader).
//!
//! Every field is a single atomic scalar, so a reader only ever sees a value that was
//! validly written at some point. Values are range checked before they are stored; a
//! rejected write leaves the previous value in place.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },
    #[error("`{key}` must be within [{min}, {max}], got {value}")]
    OutOfRange {
        key: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

// ==========================================
// 1. 原子标量
// ==========================================

#[derive(Debug)]
pub struct Toggle(AtomicBool);

impl Toggle {
    pub fn new(on: bool) -> Self {
        Self(AtomicBool::new(on))
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, on: bool) {
        self.0.store(on, Ordering::Relaxed);
    }
}

/// A fixed-point scalar: stored as `value * scale` in a `u32`, bounded in stored units.
#[derive(Debug)]
pub struct Bounded {
    raw: AtomicU32,
    min: u32,
    max: u32,
    scale: u32,
}

impl Bounded {
    pub fn new(raw: u32, min: u32, max: u32, scale: u32) -> Self {
        assert!(min <= raw && raw <= max, "default {raw} outside [{min}, {max}]");
        assert!(scale > 0);
        Self {
            raw: AtomicU32::new(raw),
            min,
            max,
            scale,
        }
    }

    pub fn raw(&self) -> u32 {
        self.raw.load(Ordering::Relaxed)
    }

    pub fn value(&self) -> f64 {
        self.raw() as f64 / self.scale as f64
    }

    pub fn min(&self) -> f64 {
        self.min as f64 / self.scale as f64
    }

    pub fn max(&self) -> f64 {
        self.max as f64 / self.scale as f64
    }

    pub fn set_raw(&self, key: &str, raw: u32) -> Result<(), ConfigError> {
        if raw < self.min || raw > self.max {
            return Err(ConfigError::OutOfRange {
                key: key.to_string(),
                value: raw as f64 / self.scale as f64,
                min: self.min(),
                max: self.max(),
            });
        }
        self.raw.store(raw, Ordering::Relaxed);
        Ok(())
    }

    pub fn set_value(&self, key: &str, value: f64) -> Result<(), ConfigError> {
        if !value.is_finite() {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        let scaled = (value * self.scale as f64).round();
        if scaled < self.min as f64 || scaled > self.max as f64 {
            return Err(ConfigError::OutOfRange {
                key: key.to_string(),
                value,
                min: self.min(),
                max: self.max(),
            });
        }
        self.raw.store(scaled as u32, Ordering::Relaxed);
        Ok(())
    }
}

// ==========================================
// 2. 面板描述 (代替 UI 构建)
// ==========================================

#[derive(Clone, Copy)]
pub enum Control<'a> {
    Toggle(&'a Toggle),
    Bounded(&'a Bounded),
}

#[derive(Clone, Copy)]
pub struct ConfigOption<'a> {
    pub key: &'static str,
    pub label: &'static str,
    pub control: Control<'a>,
}

impl<'a> ConfigOption<'a> {
    pub fn toggle(key: &'static str, label: &'static str, toggle: &'a Toggle) -> Self {
        Self {
            key,
            label,
            control: Control::Toggle(toggle),
        }
    }

    pub fn bounded(key: &'static str, label: &'static str, bounded: &'a Bounded) -> Self {
        Self {
            key,
            label,
            control: Control::Bounded(bounded),
        }
    }

    pub fn apply(&self, raw: &str) -> Result<(), ConfigError> {
        let raw = raw.trim();
        match self.control {
            Control::Toggle(toggle) => {
                let on = parse_switch(raw).ok_or_else(|| ConfigError::InvalidValue {
                    key: self.key.to_string(),
                    value: raw.to_string(),
                })?;
                toggle.set(on);
                Ok(())
            }
            Control::Bounded(bounded) => {
                let value: f64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                    key: self.key.to_string(),
                    value: raw.to_string(),
                })?;
                bounded.set_value(self.key, value)
            }
        }
    }

    pub fn display(&self) -> String {
        match self.control {
            Control::Toggle(toggle) => switch_text(toggle.get()).to_string(),
            Control::Bounded(bounded) => format!(
                "{} [{}, {}]",
                bounded.value(),
                bounded.min(),
                bounded.max()
            ),
        }
    }
}

fn switch_text(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

fn parse_switch(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Some(true),
        "off" | "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

pub struct Panel<'a> {
    pub title: &'static str,
    pub options: Vec<ConfigOption<'a>>,
}

impl Panel<'_> {
    pub fn find(&self, key: &str) -> Option<&ConfigOption<'_>> {
        self.options.iter().find(|option| option.key == key)
    }
}

/// Configuration owned by one module and shared with the configuration writer.
pub trait ModuleConfig: Send + Sync {
    fn key(&self) -> &'static str;
    fn panel(&self) -> Panel<'_>;
}

// ==========================================
// 3. 各模块的配置
// ==========================================

pub const DROP_CHANCE_MAX: u32 = 10000;

#[derive(Debug)]
pub struct DropConfig {
    pub enabled: Toggle,
    pub inbound: Toggle,
    pub outbound: Toggle,
    pub random: Toggle,
    /// basis points, [0, 10000]
    pub chance: Bounded,
}

impl Default for DropConfig {
    fn default() -> Self {
        Self {
            enabled: Toggle::new(false),
            inbound: Toggle::new(true),
            outbound: Toggle::new(true),
            random: Toggle::new(true),
            chance: Bounded::new(1000, 0, DROP_CHANCE_MAX, 100),
        }
    }
}

impl ModuleConfig for DropConfig {
    fn key(&self) -> &'static str {
        "drop"
    }

    fn panel(&self) -> Panel<'_> {
        Panel {
            title: "Drop",
            options: vec![
                ConfigOption::toggle("drop", "Enabled", &self.enabled),
                ConfigOption::toggle("drop-inbound", "Inbound", &self.inbound),
                ConfigOption::toggle("drop-outbound", "Outbound", &self.outbound),
                ConfigOption::toggle("drop-random", "Random Drop", &self.random),
                ConfigOption::bounded("drop-chance", "Chance(%)", &self.chance),
            ],
        }
    }
}

#[derive(Debug)]
pub struct CapConfig {
    pub enabled: Toggle,
    pub inbound: Toggle,
    pub outbound: Toggle,
    /// hundredths of Mb/s, [0.1, 32.0] Mb/s
    pub kps: Bounded,
}

impl CapConfig {
    pub fn rate_mbps(&self) -> f64 {
        self.kps.value()
    }
}

impl Default for CapConfig {
    fn default() -> Self {
        Self {
            enabled: Toggle::new(false),
            inbound: Toggle::new(true),
            outbound: Toggle::new(true),
            kps: Bounded::new(100, 10, 3200, 100),
        }
    }
}

impl ModuleConfig for CapConfig {
    fn key(&self) -> &'static str {
        "cap"
    }

    fn panel(&self) -> Panel<'_> {
        Panel {
            title: "Cap",
            options: vec![
                ConfigOption::toggle("cap", "Enabled", &self.enabled),
                ConfigOption::toggle("cap-inbound", "Inbound", &self.inbound),
                ConfigOption::toggle("cap-outbound", "Outbound", &self.outbound),
                ConfigOption::bounded("cap-kps", "Bandwidth Cap(Mb/s)", &self.kps),
            ],
        }
    }
}

#[derive(Debug)]
pub struct JitterConfig {
    pub enabled: Toggle,
    pub inbound: Toggle,
    pub outbound: Toggle,
    /// milliseconds, [0, 3000]
    pub time: Bounded,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            enabled: Toggle::new(false),
            inbound: Toggle::new(true),
            outbound: Toggle::new(true),
            time: Bounded::new(50, 0, 3000, 1),
        }
    }
}

impl ModuleConfig for JitterConfig {
    fn key(&self) -> &'static str {
        "jitter"
    }

    fn panel(&self) -> Panel<'_> {
        Panel {
            title: "Jitter",
            options: vec![
                ConfigOption::toggle("jitter", "Enabled", &self.enabled),
                ConfigOption::toggle("jitter-inbound", "Inbound", &self.inbound),
                ConfigOption::toggle("jitter-outbound", "Outbound", &self.outbound),
                ConfigOption::bounded("jitter-time", "Jitter(ms)", &self.time),
            ],
        }
    }
}

// ==========================================
// 4. 配置注册表：CLI 和控制台都从这里写
// ==========================================

#[derive(Clone, Default)]
pub struct ConfigRegistry {
    modules: Vec<Arc<dyn ModuleConfig>>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, config: Arc<dyn ModuleConfig>) {
        self.modules.push(config);
    }

    pub fn modules(&self) -> &[Arc<dyn ModuleConfig>] {
        &self.modules
    }

    pub fn apply(&self, key: &str, raw: &str) -> Result<(), ConfigError> {
        for module in &self.modules {
            let panel = module.panel();
            if let Some(option) = panel.find(key) {
                return option.apply(raw);
            }
        }
        Err(ConfigError::UnknownOption(key.to_string()))
    }

    /// Parses a `key=value` assignment and applies it.
    pub fn apply_assignment(&self, assignment: &str) -> Result<(), ConfigError> {
        let (key, value) =
            assignment
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: assignment.trim().to_string(),
                    value: String::new(),
                })?;
        self.apply(key.trim(), value)
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.modules
            .iter()
            .flat_map(|module| {
                module
                    .panel()
                    .options
                    .iter()
                    .map(|option| option.key)
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (ConfigRegistry, Arc<DropConfig>, Arc<CapConfig>, Arc<JitterConfig>) {
        let drop = Arc::new(DropConfig::default());
        let cap = Arc::new(CapConfig::default());
        let jitter = Arc::new(JitterConfig::default());
        let mut registry = ConfigRegistry::new();
        registry.register(drop.clone());
        registry.register(cap.clone());
        registry.register(jitter.clone());
        (registry, drop, cap, jitter)
    }

    #[test]
    fn defaults() {
        let (_, drop, cap, jitter) = registry();
        assert!(!drop.enabled.get());
        assert_eq!(drop.chance.raw(), 1000);
        assert!(drop.random.get());
        assert_eq!(cap.rate_mbps(), 1.0);
        assert_eq!(jitter.time.raw(), 50);
    }

    #[test]
    fn percent_is_stored_in_basis_points() {
        let (registry, drop, _, _) = registry();
        registry.apply("drop-chance", "20").unwrap();
        assert_eq!(drop.chance.raw(), 2000);
        registry.apply("drop-chance", "12.34").unwrap();
        assert_eq!(drop.chance.raw(), 1234);
        registry.apply("drop-chance", "100").unwrap();
        assert_eq!(drop.chance.raw(), DROP_CHANCE_MAX);
    }

    #[test]
    fn cap_rate_is_fixed_point() {
        let (registry, _, cap, _) = registry();
        registry.apply("cap-kps", "0.1").unwrap();
        assert_eq!(cap.kps.raw(), 10);
        registry.apply("cap-kps", "32.0").unwrap();
        assert_eq!(cap.kps.raw(), 3200);
        assert_eq!(cap.rate_mbps(), 32.0);
    }

    #[test]
    fn out_of_range_keeps_previous_value() {
        let (registry, drop, cap, jitter) = registry();
        registry.apply("cap-kps", "2.5").unwrap();

        let err = registry.apply("cap-kps", "32.5").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
        assert_eq!(cap.kps.raw(), 250);

        assert!(registry.apply("cap-kps", "0.05").is_err());
        assert_eq!(cap.kps.raw(), 250);

        assert!(registry.apply("drop-chance", "-1").is_err());
        assert!(registry.apply("drop-chance", "100.5").is_err());
        assert_eq!(drop.chance.raw(), 1000);

        assert!(registry.apply("jitter-time", "3001").is_err());
        assert!(registry.apply("jitter-time", "NaN").is_err());
        assert_eq!(jitter.time.raw(), 50);
    }

    #[test]
    fn toggles_accept_common_spellings() {
        let (registry, drop, _, _) = registry();
        registry.apply("drop", "on").unwrap();
        assert!(drop.enabled.get());
        registry.apply("drop-inbound", "false").unwrap();
        assert!(!drop.inbound.get());
        registry.apply("drop-inbound", "1").unwrap();
        assert!(drop.inbound.get());

        let err = registry.apply("drop", "maybe").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(drop.enabled.get());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let (registry, _, _, _) = registry();
        assert_eq!(
            registry.apply("lag-time", "10"),
            Err(ConfigError::UnknownOption("lag-time".to_string()))
        );
    }

    #[test]
    fn assignments() {
        let (registry, _, _, jitter) = registry();
        registry.apply_assignment("jitter-time = 250").unwrap();
        assert_eq!(jitter.time.raw(), 250);
        assert!(registry.apply_assignment("jitter-time").is_err());
    }

    #[test]
    fn every_key_is_listed_once() {
        let (registry, _, _, _) = registry();
        let mut keys = registry.keys();
        let total = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), total);
        assert_eq!(total, 13);
    }
}
