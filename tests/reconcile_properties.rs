// tests/reconcile_properties.rs

use std::collections::BTreeSet;

use proptest::prelude::*;

use gridstage::errors::GridstageError;
use gridstage::layout::WorkerDir;
use gridstage::makeup::{makeup_job_count, missing_process_indices};
use gridstage::project::parse_subruns;
use gridstage::reconcile::scan::{missing_inputs, placeholder_lines};

fn file_names(max: usize) -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-e]{1,2}\\.root", 0..max)
}

proptest! {
    #[test]
    fn missing_inputs_is_a_sorted_set_difference(
        inputs in file_names(20),
        transferred in file_names(20),
    ) {
        let missing = missing_inputs(&inputs, &transferred);

        let expected: BTreeSet<&String> = inputs
            .iter()
            .filter(|f| !transferred.contains(f))
            .collect();
        prop_assert_eq!(missing.iter().collect::<BTreeSet<_>>(), expected);
        // Sorted and free of duplicates.
        prop_assert!(missing.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn placeholders_cover_jobs_without_good_workers(expected in 0u32..200, good in 0usize..300) {
        let lines = placeholder_lines(expected, good);
        prop_assert_eq!(lines.len(), (expected as usize).saturating_sub(good));
        prop_assert!(lines.iter().all(|l| l == "/dev/null"));
    }

    #[test]
    fn makeup_never_exceeds_configured_jobs(outstanding in 0u64..10_000, configured in 1u32..1000) {
        let n = makeup_job_count(outstanding, configured);
        prop_assert!(n <= configured);
        prop_assert!(u64::from(n) <= outstanding);
        prop_assert!(n == configured || u64::from(n) == outstanding);
    }

    #[test]
    fn process_map_is_the_complement_of_good_workers(
        num_jobs in 1u32..40,
        good in proptest::collection::btree_set(0u32..40, 0..40),
    ) {
        let good: BTreeSet<u32> = good.into_iter().filter(|p| *p < num_jobs).collect();
        let files: Vec<String> = good
            .iter()
            .map(|p| format!("/grid/dt/out/gen/1000_{p}/out_{p}.root"))
            .collect();
        let outstanding = num_jobs as usize - good.len();

        let procs = missing_process_indices(num_jobs, &files, outstanding).unwrap();
        prop_assert_eq!(procs.len(), outstanding);
        prop_assert!(procs.iter().all(|p| !good.contains(p) && *p < num_jobs));

        let off_by_one = missing_process_indices(num_jobs, &files, outstanding + 1);
        prop_assert!(matches!(off_by_one, Err(GridstageError::Consistency(_))));
    }

    #[test]
    fn subrun_lists_parse_to_sorted_distinct_values(
        subruns in proptest::collection::vec(0u32..500, 1..20),
    ) {
        let text = subruns.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
        let parsed = parse_subruns(&text).unwrap();
        let expected: Vec<u32> = subruns.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        prop_assert_eq!(parsed, expected);
    }

    #[test]
    fn worker_directory_names_classify(cluster in 0u64..1_000_000, process in 0u32..100_000) {
        prop_assert_eq!(
            WorkerDir::classify(&format!("{cluster}_{process}")),
            WorkerDir::Worker { cluster, process }
        );
        prop_assert_eq!(
            WorkerDir::classify(&format!("{cluster}_start")),
            WorkerDir::StreamStart { cluster }
        );
    }
}
