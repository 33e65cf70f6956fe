use std::fmt::Display;

/// Running min / max / mean of a sequence of counts.
#[derive(Clone, Debug, PartialEq)]
pub struct Stats {
    pub count: usize,
    pub min: usize,
    pub max: usize,
    pub avg: f32,
}

impl Stats {
    pub fn new_single(v: usize) -> Self {
        Stats {
            count: 1,
            min: v,
            max: v,
            avg: v as f32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn add_sample(&mut self, value: usize) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.avg += (value as f32 - self.avg) / (self.count as f32);
    }

    pub fn merge(&self, other: &Self) -> Self {
        Stats {
            count: self.count + other.count,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            avg: if self.count > 0 || other.count > 0 {
                (self.avg * self.count as f32 + other.avg * other.count as f32)
                    / (self.count + other.count) as f32
            } else {
                0.0
            },
        }
    }

    /// Adds `offset` to every sample seen so far.
    pub fn shifted(&self, offset: usize) -> Self {
        if self.is_empty() {
            return self.clone();
        }
        Stats {
            count: self.count,
            min: self.min + offset,
            max: self.max + offset,
            avg: self.avg + offset as f32,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            count: 0,
            min: usize::MAX,
            max: 0,
            avg: 0.0,
        }
    }
}

impl Extend<usize> for Stats {
    fn extend<T: IntoIterator<Item = usize>>(&mut self, iter: T) {
        iter.into_iter().for_each(|v| self.add_sample(v));
    }
}

impl FromIterator<usize> for Stats {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        let mut ret = Stats::default();
        ret.extend(iter);
        ret
    }
}

impl Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "no samples");
        }
        write!(
            f,
            "{} - {}; avg {:.1}; {} samples",
            self.min, self.max, self.avg, self.count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;

    #[test]
    fn collect_samples() {
        let s: Stats = [4, 1, 7].into_iter().collect();
        assert!(s.count == 3);
        assert!(s.min == 1);
        assert!(s.max == 7);
        assert!(s.avg == 4.0);
    }

    #[test]
    fn merge_stats() {
        let a = Stats::new_single(10);
        let mut b = Stats::new_single(30);
        b.add_sample(50);
        let m = a.merge(&b);
        assert!(m.count == 3);
        assert!(m.min == 10);
        assert!(m.max == 50);
        assert!(m.avg == 30.0);
    }

    #[test]
    fn merge_with_empty() {
        let s = Stats::new_single(5);
        assert!(Stats::default().merge(&s) == s);
        assert!(Stats::default().merge(&Stats::default()) == Stats::default());
    }

    #[test]
    fn shift_keeps_count() {
        let s: Stats = [2, 4].into_iter().collect();
        let shifted = s.shifted(3);
        assert!(shifted.count == 2);
        assert!(shifted.min == 5);
        assert!(shifted.max == 7);
        assert!(shifted.avg == 6.0);
        assert!(Stats::default().shifted(3) == Stats::default());
    }

    #[test]
    fn display_format() {
        let s = Stats::new_single(42);
        let output = format!("{}", s);
        assert!(output.contains("42 - 42"));
        assert!(output.contains("avg 42.0"));
        assert!(output.contains("1 samples"));
        assert!(Stats::default().to_string() == "no samples");
    }
}
