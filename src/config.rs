use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Decodificación
    pub ffmpeg_path: PathBuf,
    pub cache_dir: PathBuf,

    // Audio
    pub opus_bitrate: u32,

    // Transporte
    pub delivery_timeout: Duration,
    pub ready_timeout: Duration,
    pub ready_poll_interval: Duration,
    pub frame_buffer: usize,

    // Rendimiento
    pub worker_threads: usize,

    /// Where the local binary writes delivered frames; discarded when unset
    pub output_path: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_vars(|key| std::env::var(key).ok())?;

        // Create the cache directory if it doesn't exist
        std::fs::create_dir_all(&config.cache_dir)
            .with_context(|| format!("creating {}", config.cache_dir.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Builds a config from a variable lookup, falling back to the defaults.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let set = |key: &str| var(key).filter(|val| !val.trim().is_empty());

        Ok(Self {
            ffmpeg_path: set("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
            cache_dir: set("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),

            opus_bitrate: parse_or("OPUS_BITRATE", set("OPUS_BITRATE"), defaults.opus_bitrate)?,

            delivery_timeout: duration_or(
                "DELIVERY_TIMEOUT",
                set("DELIVERY_TIMEOUT"),
                defaults.delivery_timeout,
            )?,
            ready_timeout: duration_or(
                "TRANSPORT_READY_TIMEOUT",
                set("TRANSPORT_READY_TIMEOUT"),
                defaults.ready_timeout,
            )?,
            ready_poll_interval: duration_or(
                "TRANSPORT_READY_POLL",
                set("TRANSPORT_READY_POLL"),
                defaults.ready_poll_interval,
            )?,
            frame_buffer: parse_or("FRAME_BUFFER", set("FRAME_BUFFER"), defaults.frame_buffer)?,

            worker_threads: parse_or(
                "WORKER_THREADS",
                set("WORKER_THREADS"),
                defaults.worker_threads,
            )?,

            output_path: set("OUTPUT_PATH").map(PathBuf::from),
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Opus bitrate must be between 8kbps and 510kbps
    /// - Timeouts and the poll interval must be non-zero
    /// - The poll interval cannot exceed the readiness timeout
    /// - Frame buffer and worker threads must be > 0
    pub fn validate(&self) -> Result<()> {
        if self.opus_bitrate > 510_000 {
            anyhow::bail!("Opus bitrate cannot exceed 510kbps, got: {}", self.opus_bitrate);
        }

        if self.opus_bitrate < 8_000 {
            anyhow::bail!("Opus bitrate too low, minimum 8kbps, got: {}", self.opus_bitrate);
        }

        if self.delivery_timeout.is_zero() {
            anyhow::bail!("Delivery timeout must be greater than 0");
        }

        if self.ready_timeout.is_zero() || self.ready_poll_interval.is_zero() {
            anyhow::bail!("Transport readiness timeout and poll interval must be greater than 0");
        }

        if self.ready_poll_interval > self.ready_timeout {
            anyhow::bail!(
                "Readiness poll interval ({}) exceeds readiness timeout ({})",
                humantime::format_duration(self.ready_poll_interval),
                humantime::format_duration(self.ready_timeout)
            );
        }

        if self.frame_buffer == 0 {
            anyhow::bail!("Frame buffer must be greater than 0");
        }

        if self.worker_threads == 0 {
            anyhow::bail!("Worker threads must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Decoder: {} (cache: {})\n  \
            Audio: {}kbps, 20ms frames\n  \
            Transport: {} delivery, {} ready timeout, {} frame buffer\n  \
            Runtime: {} workers, output: {}",
            self.ffmpeg_path.display(),
            self.cache_dir.display(),
            self.opus_bitrate / 1000,
            humantime::format_duration(self.delivery_timeout),
            humantime::format_duration(self.ready_timeout),
            self.frame_buffer,
            self.worker_threads,
            self.output_path
                .as_ref()
                .map_or("discarded".to_string(), |p| p.display().to_string()),
        )
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(val) => val
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, val)),
        None => Ok(default),
    }
}

fn duration_or(key: &str, raw: Option<String>, default: Duration) -> Result<Duration> {
    match raw {
        Some(val) => humantime::parse_duration(val.trim())
            .with_context(|| format!("{} is not a duration (e.g. 200ms, 2s): {:?}", key, val)),
        None => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".into(),
            cache_dir: "cache".into(),

            opus_bitrate: 96_000, // 96kbps (Discord default)

            delivery_timeout: Duration::from_millis(200),
            ready_timeout: Duration::from_secs(2),
            ready_poll_interval: Duration::from_millis(100),
            frame_buffer: 50, // 1s de audio

            worker_threads: num_cpus::get(),

            output_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_variables() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.cache_dir, PathBuf::from("cache"));
        assert_eq!(config.opus_bitrate, 96_000);
        assert_eq!(config.delivery_timeout, Duration::from_millis(200));
        assert_eq!(config.ready_timeout, Duration::from_secs(2));
        assert_eq!(config.ready_poll_interval, Duration::from_millis(100));
        assert_eq!(config.frame_buffer, 50);
        assert_eq!(config.output_path, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reads_variables() {
        let config = config_from(&[
            ("FFMPEG_PATH", "/usr/bin/ffmpeg"),
            ("OPUS_BITRATE", "128000"),
            ("DELIVERY_TIMEOUT", "150ms"),
            ("TRANSPORT_READY_TIMEOUT", "5s"),
            ("WORKER_THREADS", "2"),
            ("OUTPUT_PATH", "frames.bin"),
        ])
        .unwrap();

        assert_eq!(config.ffmpeg_path, PathBuf::from("/usr/bin/ffmpeg"));
        assert_eq!(config.opus_bitrate, 128_000);
        assert_eq!(config.delivery_timeout, Duration::from_millis(150));
        assert_eq!(config.ready_timeout, Duration::from_secs(5));
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.output_path, Some(PathBuf::from("frames.bin")));
    }

    #[test]
    fn test_blank_variable_uses_default() {
        let config = config_from(&[("WORKER_THREADS", "  "), ("OUTPUT_PATH", "")]).unwrap();

        assert_eq!(config.worker_threads, num_cpus::get());
        assert_eq!(config.output_path, None);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(config_from(&[("OPUS_BITRATE", "loud")]).is_err());
        assert!(config_from(&[("DELIVERY_TIMEOUT", "200")]).is_err());
    }

    #[test]
    fn test_validate_bitrate_bounds() {
        let mut config = Config::default();
        config.opus_bitrate = 600_000;
        assert!(config.validate().is_err());

        config.opus_bitrate = 4_000;
        assert!(config.validate().is_err());

        config.opus_bitrate = 8_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_poll_interval() {
        let config = Config {
            ready_poll_interval: Duration::from_secs(3),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            delivery_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_mentions_output() {
        let config = Config {
            output_path: Some("out.bin".into()),
            ..Config::default()
        };
        let summary = config.summary();

        assert!(summary.contains("96kbps"));
        assert!(summary.contains("out.bin"));
        assert!(summary.contains("200ms"));
    }
}
