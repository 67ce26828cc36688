use std::{fmt, str::FromStr};

use zstd::zstd_safe;

use crate::{ArchiveError, Result};

/// zstd's own default level.
pub const DEFAULT_LEVEL: i32 = 3;

/// 1 MiB of uncompressed input per frame.
pub const DEFAULT_MIN_FRAME_SIZE: usize = 1 << 20;

/// Upper bound accepted for the worker hint (zstd's multithreading cap).
pub const MAX_WORKERS: u32 = 200;

/// Largest frame threshold; seek-table entries store sizes as `u32`.
pub const MAX_MIN_FRAME_SIZE: usize = u32::MAX as usize;

/// zstd match-finding strategy, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    #[default]
    Fast,
    DFast,
    Greedy,
    Lazy,
    Lazy2,
    BtLazy2,
    BtOpt,
    BtUltra,
    BtUltra2,
}

impl Strategy {
    pub(crate) fn to_zstd(self) -> zstd_safe::Strategy {
        use zstd_safe::Strategy as Z;
        match self {
            Strategy::Fast => Z::ZSTD_fast,
            Strategy::DFast => Z::ZSTD_dfast,
            Strategy::Greedy => Z::ZSTD_greedy,
            Strategy::Lazy => Z::ZSTD_lazy,
            Strategy::Lazy2 => Z::ZSTD_lazy2,
            Strategy::BtLazy2 => Z::ZSTD_btlazy2,
            Strategy::BtOpt => Z::ZSTD_btopt,
            Strategy::BtUltra => Z::ZSTD_btultra,
            Strategy::BtUltra2 => Z::ZSTD_btultra2,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Strategy::Fast => "fast",
            Strategy::DFast => "dfast",
            Strategy::Greedy => "greedy",
            Strategy::Lazy => "lazy",
            Strategy::Lazy2 => "lazy2",
            Strategy::BtLazy2 => "btlazy2",
            Strategy::BtOpt => "btopt",
            Strategy::BtUltra => "btultra",
            Strategy::BtUltra2 => "btultra2",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let v = match s.to_ascii_lowercase().as_str() {
            "fast" => Strategy::Fast,
            "dfast" => Strategy::DFast,
            "greedy" => Strategy::Greedy,
            "lazy" => Strategy::Lazy,
            "lazy2" => Strategy::Lazy2,
            "btlazy2" => Strategy::BtLazy2,
            "btopt" => Strategy::BtOpt,
            "btultra" => Strategy::BtUltra,
            "btultra2" => Strategy::BtUltra2,
            other => return Err(format!("unknown strategy {other:?}")),
        };
        Ok(v)
    }
}

/// Writer settings, fixed for the lifetime of a session.
///
/// `min_frame_size` trades random-access granularity for ratio: smaller frames
/// seek finer but pay per-frame overhead. `0` ends a frame on every write that
/// finds bytes pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// Compression level (negative levels allowed down to zstd's minimum)
    pub level: i32,
    pub strategy: Strategy,
    /// Compressor worker threads, 0 = single-threaded
    pub workers: u32,
    /// Soft frame boundary in uncompressed bytes
    pub min_frame_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            strategy: Strategy::default(),
            workers: 0,
            min_frame_size: DEFAULT_MIN_FRAME_SIZE,
        }
    }
}

impl WriterConfig {
    pub fn new(workers: u32, min_frame_size: usize) -> Self {
        Self {
            workers,
            min_frame_size,
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let (min, max) = (zstd_safe::min_c_level(), zstd_safe::max_c_level());
        if self.level < min || self.level > max {
            return Err(ArchiveError::Config(format!(
                "level {} outside [{min}, {max}]",
                self.level
            )));
        }
        if self.workers > MAX_WORKERS {
            return Err(ArchiveError::Config(format!(
                "workers {} exceeds {MAX_WORKERS}",
                self.workers
            )));
        }
        if self.min_frame_size > MAX_MIN_FRAME_SIZE {
            return Err(ArchiveError::Config(format!(
                "min_frame_size {} exceeds {MAX_MIN_FRAME_SIZE}",
                self.min_frame_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn defaults_are_valid() {
        let cfg = WriterConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.strategy, Strategy::Fast);
        assert_eq!(cfg.workers, 0);
        assert_eq!(cfg.min_frame_size, DEFAULT_MIN_FRAME_SIZE);
    }

    #[test]
    fn rejects_out_of_range_level() {
        let err = WriterConfig::default().with_level(1000).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn rejects_too_many_workers() {
        let err = WriterConfig::new(MAX_WORKERS + 1, 0).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn rejects_frame_threshold_beyond_u32() {
        WriterConfig::new(0, MAX_MIN_FRAME_SIZE).validate().unwrap();
        let err = WriterConfig::new(0, usize::MAX).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!("BtUltra2".parse::<Strategy>().unwrap(), Strategy::BtUltra2);
        assert_eq!("fast".parse::<Strategy>().unwrap().to_string(), "fast");
        assert!("turbo".parse::<Strategy>().is_err());
    }
}
