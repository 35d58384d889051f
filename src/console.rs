use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::config::{ConfigError, ConfigRegistry};

#[derive(Debug, PartialEq)]
pub enum Command<'a> {
    Set { key: &'a str, value: &'a str },
    Show,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<Command<'_>>, ConfigError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    match line {
        "show" => return Ok(Some(Command::Show)),
        "help" | "?" => return Ok(Some(Command::Help)),
        "quit" | "exit" => return Ok(Some(Command::Quit)),
        _ => {}
    }

    let (key, value) = line
        .split_once('=')
        .or_else(|| line.split_once(char::is_whitespace))
        .ok_or_else(|| ConfigError::InvalidValue {
            key: line.to_string(),
            value: String::new(),
        })?;
    Ok(Some(Command::Set {
        key: key.trim(),
        value: value.trim(),
    }))
}

/// Runs one console line against the registry.
pub fn execute(registry: &ConfigRegistry, line: &str) -> Result<(), ConfigError> {
    match parse_command(line)? {
        None => Ok(()),
        Some(Command::Set { key, value }) => {
            registry.apply(key, value)?;
            info!("{} = {}", key, value);
            Ok(())
        }
        Some(Command::Show) => {
            show(registry);
            Ok(())
        }
        Some(Command::Help) => {
            info!("usage: <key> <value> | <key>=<value> | show | quit");
            info!("keys: {}", registry.keys().join(", "));
            Ok(())
        }
        // 退出由 spawn 里的循环处理
        Some(Command::Quit) => Ok(()),
    }
}

pub fn show(registry: &ConfigRegistry) {
    for module in registry.modules() {
        let panel = module.panel();
        info!("[{}]", panel.title);
        for option in &panel.options {
            info!("  {:<16} {:<20} {}", option.key, option.label, option.display());
        }
    }
}

// ==========================================
// 配置写入线程：只写原子标量，不碰包
// ==========================================
pub fn spawn(
    registry: ConfigRegistry,
    running: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if matches!(parse_command(&line), Ok(Some(Command::Quit))) {
                    info!("quit requested");
                    running.store(false, Ordering::Relaxed);
                    break;
                }
                if let Err(e) = execute(&registry, &line) {
                    warn!("{}", e);
                }
            }
        })
}
