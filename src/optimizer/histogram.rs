use crate::predicate::Op;

/// Fixed-width histogram over an inclusive integer range, used to estimate
/// the selectivity of a predicate against a column. Counts only grow:
/// values are folded in with `add_value` and never removed.
pub struct IntHistogram {
    min: i64,
    max: i64,

    /// bucket width; at least 1 even when the range is narrower than the
    /// bucket count
    width: i64,

    buckets: Vec<usize>,
    total: usize,
}

impl IntHistogram {
    pub fn new(bucket_count: usize, min: i64, max: i64) -> Self {
        let width = std::cmp::max((max - min) / bucket_count as i64, 1);
        Self {
            min,
            max,
            width,
            buckets: vec![0; bucket_count],
            total: 0,
        }
    }

    fn bucket_index(&self, v: i64) -> usize {
        let index = (v - self.min) / self.width;
        index.max(0).min(self.buckets.len() as i64 - 1) as usize
    }

    /// Fold a value into the histogram. Out-of-range values are the caller's
    /// responsibility; when passed anyway they clamp to the edge buckets.
    pub fn add_value(&mut self, v: i64) {
        let index = self.bucket_index(v);
        self.buckets[index] += 1;
        self.total += 1;
    }

    /// Estimated fraction of recorded values satisfying `<op> v`, in
    /// [0.0, 1.0].
    ///
    /// The probe's own bucket contributes its full height to EQUALS and
    /// nothing to the strict comparisons; the fractional position of the
    /// probe inside its bucket is deliberately ignored.
    pub fn estimate_selectivity(&self, op: Op, v: i64) -> f64 {
        if self.total == 0 {
            return 0.0;
        }

        match op {
            Op::Equals => {
                if v < self.min || v > self.max {
                    return 0.0;
                }
                let height = self.buckets[self.bucket_index(v)] as f64;
                height / (self.width as f64 * self.total as f64)
            }
            Op::NotEquals => 1.0 - self.estimate_selectivity(Op::Equals, v),
            Op::LessThan => {
                if v < self.min {
                    return 0.0;
                }
                if v > self.max {
                    return 1.0;
                }
                let index = self.bucket_index(v);
                let below: usize = self.buckets[..index].iter().sum();
                below as f64 / self.total as f64
            }
            Op::GreaterThan => {
                if v < self.min {
                    return 1.0;
                }
                if v > self.max {
                    return 0.0;
                }
                let index = self.bucket_index(v);
                let above: usize = self.buckets[index + 1..].iter().sum();
                above as f64 / self.total as f64
            }
            Op::LessThanOrEq => {
                self.estimate_selectivity(Op::LessThan, v)
                    + self.estimate_selectivity(Op::Equals, v)
            }
            Op::GreaterThanOrEq => {
                self.estimate_selectivity(Op::GreaterThan, v)
                    + self.estimate_selectivity(Op::Equals, v)
            }
        }
    }
}
