//! Property-based tests for the RED block codec and block indexing.

use mef3::format::index::IndexFile;
use mef3::format::red::{self, max_compressed_bytes, RedBlock};
use mef3::path::segment_dir_name;
use mef3::{
    write_ts_data, write_ts_metadata, Credentials, LossyConfig, MefConfig, Section3,
    TimeSeriesSection2, WriteOptions,
};
use proptest::prelude::*;
use tempfile::TempDir;

/// Slowly varying signal with occasional jumps that need key samples.
fn signal_strategy() -> impl Strategy<Value = Vec<i32>> {
    prop::collection::vec((-40i32..40, prop::bool::weighted(0.05), any::<i32>()), 1..600)
        .prop_map(|steps| {
            let mut current = 0i32;
            steps
                .into_iter()
                .map(|(step, jump, target)| {
                    current = if jump {
                        target
                    } else {
                        current.saturating_add(step)
                    };
                    current
                })
                .collect()
        })
}

proptest! {
    /// Lossless blocks decode to exactly the input, for any i32 values.
    #[test]
    fn test_red_roundtrip_proptest(samples in prop::collection::vec(any::<i32>(), 1..300)) {
        let block = RedBlock::compress(&samples, 0, false, None).unwrap();
        prop_assert!(block.len() <= max_compressed_bytes(samples.len()));
        prop_assert_eq!(block.len() % 8, 0);

        let decoded = red::decompress(&block.bytes).unwrap();
        prop_assert_eq!(decoded, samples);
    }

    /// Realistic signals round trip and carry their extrema.
    #[test]
    fn test_red_signal_roundtrip_proptest(samples in signal_strategy()) {
        let block = RedBlock::compress(&samples, 1_000_000, true, None).unwrap();
        prop_assert_eq!(block.minimum_sample_value, *samples.iter().min().unwrap());
        prop_assert_eq!(block.maximum_sample_value, *samples.iter().max().unwrap());
        prop_assert!(block.header.flags.is_discontinuity());

        let decoded = red::decompress(&block.bytes).unwrap();
        prop_assert_eq!(decoded, samples);
    }

    /// Lossy blocks stay within half a quantization step of the input.
    #[test]
    fn test_red_lossy_error_bound_proptest(
        samples in prop::collection::vec(-100_000i32..100_000, 2..400)
    ) {
        let lossy = LossyConfig::default();
        let block = RedBlock::compress(&samples, 0, false, Some(&lossy)).unwrap();
        let bound = f64::from(block.header.scale_factor) / 2.0 + 1.0;

        let decoded = red::decompress(&block.bytes).unwrap();
        prop_assert_eq!(decoded.len(), samples.len());
        for (original, restored) in samples.iter().zip(decoded.iter()) {
            let error = (f64::from(*original) - f64::from(*restored)).abs();
            prop_assert!(error <= bound, "error {} above {}", error, bound);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Index entries tile the data file and the sample range without gaps.
    #[test]
    fn test_index_is_contiguous_proptest(
        count in 1usize..2_000,
        block_size in 1usize..300,
    ) {
        let temp_dir = TempDir::new().unwrap();
        let segment = temp_dir
            .path()
            .join("p.mefd")
            .join("C4.timd")
            .join(segment_dir_name("C4", 0));
        let config = MefConfig::default();
        write_ts_metadata(
            &segment,
            &Credentials::unencrypted(),
            0,
            0,
            TimeSeriesSection2::with_sampling(512.0, 0),
            Section3::default(),
            &config,
        )
        .unwrap();
        let samples: Vec<i32> = (0..count as i32).map(|i| (i * 7) % 113 - 56).collect();
        let summary = write_ts_data(
            &segment,
            &Credentials::unencrypted(),
            &samples,
            WriteOptions::new(block_size),
            &config,
        )
        .unwrap();

        let index = IndexFile::read(&segment.join("C4-000000.tidx")).unwrap();
        prop_assert_eq!(index.entries.len(), count.div_ceil(block_size));
        prop_assert_eq!(summary.number_of_blocks, index.entries.len() as i64);
        prop_assert_eq!(index.entries[0].start_sample, 0);
        for pair in index.entries.windows(2) {
            prop_assert_eq!(
                pair[1].file_offset,
                pair[0].file_offset + i64::from(pair[0].block_bytes)
            );
            prop_assert_eq!(pair[1].start_sample, pair[0].end_sample());
            prop_assert!(pair[1].start_time > pair[0].start_time);
        }
        let last = index.entries[index.entries.len() - 1];
        prop_assert_eq!(last.end_sample(), count as i64);
    }
}
