use serde::{Deserialize, Serialize};

use fhmc_core::{ErrorInfo, McError, System};

/// Order parameter used to bin system states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MacrostateKind {
    /// Number of particles.
    NumParticles,
    /// Total potential energy.
    Energy,
}

/// Fixed-width histogram whose bins are centred on `min + i * width`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    width: f64,
    min: f64,
    num_bins: usize,
}

impl Histogram {
    /// Builds the histogram covering `[min, max]` with bins of `width`.
    pub fn new(width: f64, min: f64, max: f64) -> Result<Self, McError> {
        if !(width.is_finite() && width > 0.0 && min.is_finite() && max.is_finite()) {
            return Err(McError::Config(
                ErrorInfo::new("histogram-range", "histogram width and range must be finite")
                    .with_context("width", width)
                    .with_context("min", min)
                    .with_context("max", max),
            ));
        }
        let span = ((max - min) / width).round();
        if span < 1.0 {
            return Err(McError::Config(
                ErrorInfo::new("histogram-bins", "num >= 2 required for a histogram")
                    .with_context("min", min)
                    .with_context("max", max)
                    .with_context("width", width),
            ));
        }
        Ok(Self {
            width,
            min,
            num_bins: span as usize + 1,
        })
    }

    /// Bin width.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Centre of the first bin.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Centre of the last bin.
    pub fn max(&self) -> f64 {
        self.center_of_bin(self.num_bins - 1)
    }

    /// Number of bins.
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Lower edge of the first bin.
    pub fn origin(&self) -> f64 {
        self.min - 0.5 * self.width
    }

    /// Centre value of `bin`.
    pub fn center_of_bin(&self, bin: usize) -> f64 {
        self.min + bin as f64 * self.width
    }

    /// Bin of `value`. May fall outside `[0, num_bins)`.
    pub fn bin(&self, value: f64) -> i64 {
        ((value - self.origin()) / self.width).floor() as i64
    }
}

/// Maps a system snapshot to a histogram bin and enforces soft bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macrostate {
    kind: MacrostateKind,
    histogram: Histogram,
    soft_min: usize,
    soft_max: usize,
}

impl Macrostate {
    /// Macrostate with soft bounds spanning the whole histogram.
    pub fn new(kind: MacrostateKind, histogram: Histogram) -> Self {
        let soft_max = histogram.num_bins() - 1;
        Self {
            kind,
            histogram,
            soft_min: 0,
            soft_max,
        }
    }

    /// Order parameter kind.
    pub fn kind(&self) -> MacrostateKind {
        self.kind
    }

    /// Underlying histogram.
    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    /// Number of bins in the full histogram.
    pub fn num_bins(&self) -> usize {
        self.histogram.num_bins()
    }

    /// Centre value of `bin`.
    pub fn center_of_bin(&self, bin: usize) -> f64 {
        self.histogram.center_of_bin(bin)
    }

    /// Order parameter of `system`.
    pub fn value<S: System>(&self, system: &S) -> f64 {
        match self.kind {
            MacrostateKind::NumParticles => system.num_particles() as f64,
            MacrostateKind::Energy => system.current_energy(),
        }
    }

    /// Bin of `system`.
    pub fn bin<S: System>(&self, system: &S) -> i64 {
        self.histogram.bin(self.value(system))
    }

    /// Whether `system`, shifted by `shift` bins, lies inside the soft bounds.
    pub fn is_allowed<S: System>(&self, system: &S, shift: i64) -> bool {
        self.is_bin_allowed(self.bin(system) + shift)
    }

    /// Whether `bin` lies inside the soft bounds.
    pub fn is_bin_allowed(&self, bin: i64) -> bool {
        bin >= self.soft_min as i64 && bin <= self.soft_max as i64
    }

    /// Whether `bin` lies inside the full histogram.
    pub fn in_histogram(&self, bin: i64) -> bool {
        bin >= 0 && bin < self.num_bins() as i64
    }

    /// Lowest allowed bin.
    pub fn soft_min(&self) -> usize {
        self.soft_min
    }

    /// Highest allowed bin.
    pub fn soft_max(&self) -> usize {
        self.soft_max
    }

    /// Replaces both soft bounds.
    pub fn set_soft_bounds(&mut self, soft_min: usize, soft_max: usize) -> Result<(), McError> {
        if soft_min > soft_max || soft_max >= self.num_bins() {
            return Err(McError::Config(
                ErrorInfo::new("soft-bounds", "soft bounds must satisfy min <= max < num_bins")
                    .with_context("soft_min", soft_min)
                    .with_context("soft_max", soft_max)
                    .with_context("num_bins", self.num_bins()),
            ));
        }
        self.soft_min = soft_min;
        self.soft_max = soft_max;
        Ok(())
    }

    /// Grows the upper soft bound by one bin.
    pub fn extend_max(&mut self) -> Result<(), McError> {
        self.set_soft_bounds(self.soft_min, self.soft_max + 1)
    }

    /// Shrinks the lower soft bound by one bin.
    pub fn shrink_min(&mut self) -> Result<(), McError> {
        self.set_soft_bounds(self.soft_min + 1, self.soft_max)
    }

    /// Grows the lower soft bound by one bin.
    pub fn extend_min(&mut self) -> Result<(), McError> {
        let soft_min = self.soft_min.checked_sub(1).ok_or_else(|| {
            McError::config("soft-bounds", "soft minimum is already the first bin")
        })?;
        self.set_soft_bounds(soft_min, self.soft_max)
    }

    /// Shrinks the upper soft bound by one bin.
    pub fn shrink_max(&mut self) -> Result<(), McError> {
        let soft_max = self.soft_max.checked_sub(1).ok_or_else(|| {
            McError::config("soft-bounds", "soft maximum is already the first bin")
        })?;
        self.set_soft_bounds(self.soft_min, soft_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bins_are_centred_on_integers() {
        let hist = Histogram::new(1.0, 0.0, 4.0).unwrap();
        assert_eq!(hist.num_bins(), 5);
        assert_eq!(hist.bin(0.0), 0);
        assert_eq!(hist.bin(0.49), 0);
        assert_eq!(hist.bin(0.5), 1);
        assert_eq!(hist.bin(5.0), 5);
        assert_eq!(hist.bin(-1.0), -1);
        assert_eq!(hist.max(), 4.0);
    }

    #[test]
    fn single_bin_histogram_is_rejected() {
        let err = Histogram::new(1.0, 3.0, 3.0).unwrap_err();
        assert_eq!(err.info().code, "histogram-bins");
        assert!(Histogram::new(0.0, 0.0, 3.0).is_err());
    }

    #[test]
    fn soft_bounds_move_one_bin_at_a_time() {
        let mut macrostate =
            Macrostate::new(MacrostateKind::NumParticles, Histogram::new(1.0, 0.0, 9.0).unwrap());
        macrostate.set_soft_bounds(2, 5).unwrap();
        macrostate.extend_max().unwrap();
        macrostate.shrink_min().unwrap();
        assert_eq!((macrostate.soft_min(), macrostate.soft_max()), (3, 6));
        macrostate.extend_min().unwrap();
        macrostate.shrink_max().unwrap();
        assert_eq!((macrostate.soft_min(), macrostate.soft_max()), (2, 5));
        assert!(macrostate.is_bin_allowed(2));
        assert!(!macrostate.is_bin_allowed(6));
        assert!(macrostate.set_soft_bounds(5, 10).is_err());
    }
}
