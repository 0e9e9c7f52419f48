use crossbeam_channel::bounded;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::hap_pair_segment::{sort_by_position, HapPairSegment};
use crate::ibd_estimator::{IbdEstimator, IbdEstimatorParams};
use crate::markers::Markers;
use crate::quantile_estimator::QuantileEstimator;

/// Runs seed IBS segments through a bounded pool of `IbdEstimator`s (spec.md
/// §5 "concurrent FIFO: workers poll to acquire, push back on completion").
/// `crossbeam_channel::bounded` pre-loaded with `nthreads` estimators doubles
/// as the pool: a `recv` is an acquire, a `send` back is a release.
pub fn refine_segments<'a>(
    segments: Vec<HapPairSegment>,
    markers: &'a Markers,
    quantiles: &'a QuantileEstimator<'a>,
    params: IbdEstimatorParams,
    nthreads: usize,
) -> anyhow::Result<Vec<HapPairSegment>> {
    let nthreads = nthreads.max(1);
    let pool = ThreadPoolBuilder::new().num_threads(nthreads).build()?;

    let (release, acquire) = bounded(nthreads);
    for _ in 0..nthreads {
        release
            .send(IbdEstimator::new(markers, quantiles, params))
            .expect("pool channel has room for its own capacity");
    }

    let refined: Vec<HapPairSegment> = pool.install(|| {
        segments
            .into_par_iter()
            .map(|seed| {
                let estimator = acquire.recv().expect("an estimator is always in flight");
                let result = estimator.estimate(seed);
                release.send(estimator).expect("releasing back into the pool");
                result
            })
            .filter(|seg| !seg.is_zero_length())
            .collect()
    });

    Ok(sort_by_position(refined))
}
