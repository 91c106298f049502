//! System information detection
//!
//! **Purpose:** Record CPU, OS and core count alongside benchmark results so
//! numbers from different machines are not confused.

use serde::Serialize;
#[cfg(target_os = "linux")]
use std::fs;

/// Host description included in every report
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    /// CPU model/name
    pub cpu: String,

    /// Operating system name and version
    pub os: String,

    /// Logical cores available to this process
    pub logical_cores: usize,
}

impl SystemInfo {
    /// Detect system information
    ///
    /// **Platform support:**
    /// - Linux: Reads /proc/cpuinfo and /etc/os-release
    /// - macOS: sysctl / sw_vers
    /// - Others: std::env::consts
    pub fn detect() -> Self {
        Self {
            cpu: Self::detect_cpu(),
            os: Self::detect_os(),
            logical_cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    fn detect_cpu() -> String {
        #[cfg(target_os = "linux")]
        {
            if let Ok(content) = fs::read_to_string("/proc/cpuinfo") {
                for line in content.lines() {
                    if line.starts_with("model name") {
                        if let Some(cpu_name) = line.split(':').nth(1) {
                            return cpu_name.trim().to_string();
                        }
                    }
                }
            }
        }

        #[cfg(target_os = "macos")]
        {
            if let Ok(output) = std::process::Command::new("sysctl")
                .arg("-n")
                .arg("machdep.cpu.brand_string")
                .output()
            {
                if let Ok(cpu_name) = String::from_utf8(output.stdout) {
                    return cpu_name.trim().to_string();
                }
            }
        }

        format!("Unknown CPU ({})", std::env::consts::ARCH)
    }

    fn detect_os() -> String {
        #[cfg(target_os = "linux")]
        {
            if let Ok(content) = fs::read_to_string("/etc/os-release") {
                for line in content.lines() {
                    if let Some(pretty) = line.strip_prefix("PRETTY_NAME=") {
                        return pretty.trim_matches('"').to_string();
                    }
                }
            }
            "Linux".to_string()
        }

        #[cfg(target_os = "macos")]
        {
            if let Ok(output) = std::process::Command::new("sw_vers")
                .arg("-productVersion")
                .output()
            {
                if let Ok(version) = String::from_utf8(output.stdout) {
                    return format!("macOS {}", version.trim());
                }
            }
            "macOS".to_string()
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            std::env::consts::OS.to_string()
        }
    }
}
