//! Reading worker logs and cache files
//!
//! A [`Source`] is a log file or stdin. Files ending in `.zst` or `.zstd` are
//! zstd-decoded on the fly. Each source is read as a line stream and
//! aggregated on its own, yielding one [`Analysis`].

use std::{fmt, path::PathBuf};

use async_compression::tokio::bufread::ZstdDecoder;
use benchd_telemetry::{Aggregator, Config, aggregator::Counters, cache, series::SeriesSet};
use tokio::{
    fs,
    io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader, Lines},
};
use tokio_stream::{StreamExt, wrappers::LinesStream};
use tracing::{debug, info};

use crate::Error;

type LineStream = LinesStream<Box<dyn AsyncBufRead + Unpin + Send>>;

/// Where lines come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Source {
    Stdin,
    File(PathBuf),
}

impl Source {
    fn is_compressed(&self) -> bool {
        match self {
            Source::Stdin => false,
            Source::File(path) => path
                .extension()
                .is_some_and(|ext| ext == "zst" || ext == "zstd"),
        }
    }

    async fn open(&self) -> Result<LineStream, Error> {
        let reader: Box<dyn AsyncRead + Unpin + Send> = match self {
            Source::Stdin => Box::new(tokio::io::stdin()),
            Source::File(path) => Box::new(fs::File::open(path).await?),
        };
        let reader = BufReader::new(reader);
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = if self.is_compressed() {
            debug!(source = %self, "Decoding zstd input");
            Box::new(BufReader::new(ZstdDecoder::new(reader)))
        } else {
            Box::new(reader)
        };
        let lines: Lines<_> = reader.lines();
        Ok(LinesStream::new(lines))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Stdin => f.write_str("-"),
            Source::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// The aggregated content of one source.
#[derive(Debug)]
pub(crate) struct Analysis {
    pub(crate) source: Source,
    pub(crate) series: SeriesSet,
    pub(crate) first_error_offset: Option<f64>,
}

/// Read and aggregate `source` under `config`.
pub(crate) async fn analyze(source: Source, config: &Config) -> Result<Analysis, Error> {
    let mut lines = source.open().await?;

    if config.use_cache {
        let mut records = Vec::new();
        while let Some(line) = lines.next().await {
            records.push(line?);
        }
        let series = cache::load(records.iter().map(String::as_str))
            .map_err(benchd_telemetry::Error::from)?;
        info!(source = %source, series = series.len(), "Loaded cache");
        return Ok(Analysis {
            source,
            series,
            first_error_offset: None,
        });
    }

    let mut aggregator = Aggregator::from_config(config);
    let mut number = 0;
    while let Some(line) = lines.next().await {
        let line = line?;
        number += 1;
        aggregator
            .ingest_line(&line)
            .map_err(|source| benchd_telemetry::Error::Line {
                line: number,
                source,
            })?;
    }

    let Counters {
        lines,
        foreign,
        other_kind,
        ingested,
        suppressed,
        failures,
    } = aggregator.counters();
    info!(
        source = %source,
        lines,
        foreign,
        other_kind,
        ingested,
        suppressed,
        failures,
        "Aggregated log"
    );

    let first_error_offset = aggregator.first_error_offset();
    Ok(Analysis {
        source,
        series: aggregator.into_series(),
        first_error_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const LOG: &str = "\
manager started 3 workers
W basic-50 00:00:00.500000 1 0 0 0 0 0 0 0 0 0 0 0
W basic-50 00:00:00.600000 1 1 0 0 0 0 0 0 100 130 0 0
W basic-50 00:00:01.600000 1 1 0 0 0 0 0 0 200 220 0 0
W basic-50 00:00:02.600000 1 3 0 0 0 0 0 0 0 0 0 0
";

    fn write_log(suffix: &str, contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("temp file");
        file.write_all(contents).expect("write");
        file
    }

    #[test]
    fn compression_is_detected_by_extension() {
        assert!(Source::File("run.log.zst".into()).is_compressed());
        assert!(Source::File("run.zstd".into()).is_compressed());
        assert!(!Source::File("run.log".into()).is_compressed());
        assert!(!Source::Stdin.is_compressed());
    }

    #[tokio::test]
    async fn plain_log_is_aggregated() {
        let file = write_log(".log", LOG.as_bytes());
        let analysis = analyze(Source::File(file.path().into()), &Config::default())
            .await
            .expect("valid log");
        let series = analysis.series.get("basic-50").expect("series");
        assert_eq!(series.indices(), vec![0, 1, 2]);
        assert_eq!(series.send_counts(), vec![1.0, 1.0, 0.0]);
        assert_eq!(analysis.first_error_offset, Some(1.6));
    }

    #[tokio::test]
    async fn zstd_log_matches_plain_log() {
        let compressed = zstd::encode_all(LOG.as_bytes(), 3).expect("compress");
        let file = write_log(".log.zst", &compressed);
        let analysis = analyze(Source::File(file.path().into()), &Config::default())
            .await
            .expect("valid log");
        let series = analysis.series.get("basic-50").expect("series");
        assert_eq!(series.send_counts(), vec![1.0, 1.0, 0.0]);
    }

    #[tokio::test]
    async fn malformed_line_reports_its_number() {
        let file = write_log(
            ".log",
            b"W a 00:00:00.500000 1 0 0 0 0 0 0 0 0 0 0 0\nW a 25:99:00.0 1 0 0 0 0 0 0 0 0 0 0 0\n",
        );
        let err = analyze(Source::File(file.path().into()), &Config::default())
            .await
            .expect_err("malformed timestamp");
        assert!(matches!(
            err,
            Error::Telemetry(benchd_telemetry::Error::Line { line: 2, .. })
        ));
    }

    #[tokio::test]
    async fn cache_records_are_loaded() {
        let file = write_log(".cache", b"a 0 1.5\na 1 2.5\n");
        let config = Config {
            use_cache: true,
            ..Config::default()
        };
        let analysis = analyze(Source::File(file.path().into()), &config)
            .await
            .expect("valid cache");
        assert_eq!(
            analysis.series.get("a").expect("series").send_counts(),
            vec![1.5, 2.5]
        );
        assert_eq!(analysis.first_error_offset, None);
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = analyze(
            Source::File("/nonexistent/benchd.log".into()),
            &Config::default(),
        )
        .await
        .expect_err("missing");
        assert!(matches!(err, Error::Io(_)));
    }
}
