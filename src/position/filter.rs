use crate::config::PositionConfig;
use crate::location::Location;
use tracing::debug;

/// Drops fixes whose accuracy radius is too coarse to be useful
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyFilter {
    min_accuracy_meters: f64,
    factor: f64,
}

impl AccuracyFilter {
    pub fn new(min_accuracy_meters: f64, factor: f64) -> Self {
        Self {
            min_accuracy_meters,
            factor,
        }
    }

    pub fn from_config(config: &PositionConfig) -> Self {
        Self::new(config.min_accuracy_meters, config.accuracy_filter_factor)
    }

    /// Accuracy above which a fix is discarded
    pub fn threshold_meters(&self) -> f64 {
        self.min_accuracy_meters * self.factor
    }

    pub fn accepts(&self, location: &Location) -> bool {
        let accepted = location.accuracy_meters <= self.threshold_meters();
        if !accepted {
            debug!(
                "Discarding fix with accuracy {:.1}m (threshold {:.1}m)",
                location.accuracy_meters,
                self.threshold_meters()
            );
        }
        accepted
    }
}

impl Default for AccuracyFilter {
    fn default() -> Self {
        Self::from_config(&PositionConfig::default())
    }
}
