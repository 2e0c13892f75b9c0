//! Pre-bucketed send rates
//!
//! Parsing a large benchd log is slow, and plots are often re-tuned many times
//! over the same log. The cache memoizes the send rate of every bucket as one
//! line per record:
//!
//! ```text
//! <series> <bucket> <value>
//! ```
//!
//! Loading a cache populates a [`SeriesSet`] directly, without the parser,
//! bucketer or aggregator. The cache only carries rates: worker starts are
//! zero and latency samples hold only the floor sample after a round trip.
//!
//! Unlike raw logs, cache input is strict. A line that does not split into
//! exactly three fields, blank lines included, or whose bucket or value does
//! not parse, is an error. When a (series, bucket) pair repeats, the first
//! value wins.

use std::io::{self, BufRead, Write};

use tracing::debug;

use crate::series::SeriesSet;

/// Errors produced while reading or writing a cache
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A record does not have three fields
    #[error("Cache line {line}: expected 3 fields, found {found}")]
    Arity {
        /// 1-based line number
        line: usize,
        /// Number of fields found
        found: usize,
    },
    /// The bucket field is not a non-negative integer
    #[error("Cache line {line}: malformed bucket index {value:?}")]
    Bucket {
        /// 1-based line number
        line: usize,
        /// The offending field
        value: String,
    },
    /// The value field is not a decimal number
    #[error("Cache line {line}: malformed value {value:?}")]
    Value {
        /// 1-based line number
        line: usize,
        /// The offending field
        value: String,
    },
    /// I/O error
    #[error("Cache I/O error: {0}")]
    Io(#[from] io::Error),
}

fn record(set: &mut SeriesSet, number: usize, line: &str) -> Result<(), Error> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [name, bucket, value] = fields[..] else {
        return Err(Error::Arity {
            line: number,
            found: fields.len(),
        });
    };
    let index: u64 = bucket.parse().map_err(|_| Error::Bucket {
        line: number,
        value: bucket.to_string(),
    })?;
    let value: f64 = value.parse().map_err(|_| Error::Value {
        line: number,
        value: value.to_string(),
    })?;

    let series = set.get_or_insert(name);
    if series.contains(index) {
        debug!(series = %name, bucket = index, "Duplicate cache record ignored");
        return Ok(());
    }
    series.bucket_mut(index).send_count = value;
    Ok(())
}

/// Build series from cache records.
///
/// # Errors
///
/// Returns an error naming the first malformed record.
pub fn load<'a, I>(lines: I) -> Result<SeriesSet, Error>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut set = SeriesSet::new();
    for (number, line) in lines.into_iter().enumerate() {
        record(&mut set, number + 1, line)?;
    }
    Ok(set)
}

/// Build series from a cache file or stream.
///
/// # Errors
///
/// Returns an error on I/O failure or on the first malformed record.
pub fn load_reader<R: BufRead>(reader: R) -> Result<SeriesSet, Error> {
    let mut set = SeriesSet::new();
    for (number, line) in reader.lines().enumerate() {
        record(&mut set, number + 1, &line?)?;
    }
    Ok(set)
}

/// Write one record per bucket of every series, series in first-observed
/// order and buckets in index order.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn dump<W: Write>(series: &SeriesSet, mut writer: W) -> Result<(), Error> {
    for s in series {
        for bucket in s.buckets() {
            writeln!(writer, "{} {} {}", s.name(), bucket.index(), bucket.send_count)?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Seek, SeekFrom};

    use approx::assert_relative_eq;
    use proptest::prelude::*;

    use crate::aggregator::{Aggregator, ErrorPolicy};
    use crate::bucket::AnchorScope;

    fn dumped(set: &SeriesSet) -> String {
        let mut out = Vec::new();
        dump(set, &mut out).expect("write to vec");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn loads_records() {
        let set = load(["basic-50 0 1.0", "basic-50 1 2.5", "other 0 3"]).expect("valid");
        let names: Vec<&str> = set.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["basic-50", "other"]);
        let basic = set.get("basic-50").expect("series");
        assert_eq!(basic.send_counts(), vec![1.0, 2.5]);
        let bucket = basic.get(1).expect("bucket");
        assert_eq!(bucket.worker_starts, 0);
        assert_eq!(bucket.latencies(), &[0]);
    }

    #[test]
    fn first_duplicate_wins() {
        let set = load(["a 0 1.0", "a 0 9.0"]).expect("valid");
        assert_eq!(set.get("a").expect("series").send_counts(), vec![1.0]);
    }

    #[test]
    fn wrong_arity_is_fatal() {
        let err = load(["a 0 1.0", "a 1"]).expect_err("two fields");
        assert!(matches!(err, Error::Arity { line: 2, found: 2 }));
        let err = load(["a 0 1.0 extra"]).expect_err("four fields");
        assert!(matches!(err, Error::Arity { line: 1, found: 4 }));
    }

    #[test]
    fn blank_line_is_fatal() {
        let err = load(["a 0 1.0", "", "a 1 2.0"]).expect_err("blank line");
        assert!(matches!(err, Error::Arity { line: 2, found: 0 }));
        let err = load_reader("a 0 1\n   \n".as_bytes()).expect_err("whitespace line");
        assert!(matches!(err, Error::Arity { line: 2, found: 0 }));
    }

    #[test]
    fn malformed_fields_are_fatal() {
        assert!(matches!(
            load(["a -1 1.0"]),
            Err(Error::Bucket { line: 1, .. })
        ));
        assert!(matches!(
            load(["a 0 fast"]),
            Err(Error::Value { line: 1, .. })
        ));
    }

    #[test]
    fn dump_orders_by_bucket() {
        let set = load(["b 2 0.5", "b 0 1", "a 0 2"]).expect("valid");
        assert_eq!(dumped(&set), "b 0 1\nb 2 0.5\na 0 2\n");
    }

    #[test]
    fn round_trip_through_file_drops_latencies() {
        let mut agg = Aggregator::new(
            std::num::NonZeroU32::new(1).expect("non-zero"),
            AnchorScope::PerSeries,
            ErrorPolicy::CountThrough,
        );
        agg.ingest_lines([
            "W a 00:00:00.100000 1 0 0 0 0 0 0 0 0 0 0 0",
            "W a 00:00:00.200000 1 1 0 0 0 0 0 0 10 30 0 0",
            "W a 00:00:01.200000 1 1 0 0 0 0 0 0 10 40 0 0",
        ])
        .expect("valid");

        let mut file = tempfile::tempfile().expect("temp file");
        dump(agg.series(), &mut file).expect("dump");
        file.seek(SeekFrom::Start(0)).expect("rewind");
        let loaded = load_reader(BufReader::new(file)).expect("load");

        let original = agg.series().get("a").expect("series");
        let restored = loaded.get("a").expect("series");
        assert_eq!(original.indices(), restored.indices());
        for (o, r) in original.buckets().zip(restored.buckets()) {
            assert_relative_eq!(o.send_count, r.send_count);
            assert_eq!(r.latencies(), &[0]);
            assert_eq!(r.worker_starts, 0);
        }
    }

    proptest! {
        #[test]
        fn load_of_dump_reproduces_rates(
            records in prop::collection::btree_map(
                ("[a-z]{1,6}", 0u64..500),
                0.0f64..1e9,
                0..100,
            ),
        ) {
            let mut set = SeriesSet::new();
            for ((name, index), value) in &records {
                set.get_or_insert(name).bucket_mut(*index).send_count = *value;
            }
            let text = dumped(&set);
            let loaded = load(text.lines()).expect("dump is loadable");

            let mut triples = Vec::new();
            for s in &loaded {
                for bucket in s.buckets() {
                    triples.push(((s.name().to_string(), bucket.index()), bucket.send_count));
                }
            }
            triples.sort_by(|a, b| a.0.cmp(&b.0));
            let expected: Vec<_> = records.into_iter().collect();
            prop_assert_eq!(triples, expected);
        }
    }
}
