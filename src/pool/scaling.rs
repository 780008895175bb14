//! Adaptive scaling control loop (design §4.C "Adaptive scaling"). Pure
//! decision function plus a small sustained-sample counter; the actual
//! sampling/launch/recycle side effects live in `pool.rs`'s maintenance task.

#[derive(Debug, Clone, Copy)]
pub struct ScalingConfig {
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub sustained_samples: u32,
    pub min_size: usize,
    pub max_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
    None,
    ScaleUp,
    ScaleDown,
}

#[derive(Default)]
pub struct ScalingWindow {
    above_count: u32,
    below_count: u32,
}

impl ScalingWindow {
    pub fn sample(
        &mut self,
        utilization: f64,
        queue_depth: usize,
        current_size: usize,
        cfg: &ScalingConfig,
    ) -> ScalingDecision {
        if utilization > cfg.scale_up_threshold {
            self.above_count += 1;
            self.below_count = 0;
        } else if utilization < cfg.scale_down_threshold && queue_depth == 0 {
            self.below_count += 1;
            self.above_count = 0;
        } else {
            self.above_count = 0;
            self.below_count = 0;
        }

        if self.above_count >= cfg.sustained_samples && current_size < cfg.max_size {
            self.above_count = 0;
            ScalingDecision::ScaleUp
        } else if self.below_count >= cfg.sustained_samples && current_size > cfg.min_size {
            self.below_count = 0;
            ScalingDecision::ScaleDown
        } else {
            ScalingDecision::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ScalingConfig {
        ScalingConfig {
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.2,
            sustained_samples: 3,
            min_size: 1,
            max_size: 10,
        }
    }

    #[test]
    fn scales_up_only_after_sustained_high_utilization() {
        let mut window = ScalingWindow::default();
        let c = cfg();
        assert_eq!(window.sample(0.9, 2, 5, &c), ScalingDecision::None);
        assert_eq!(window.sample(0.9, 2, 5, &c), ScalingDecision::None);
        assert_eq!(window.sample(0.9, 2, 5, &c), ScalingDecision::ScaleUp);
    }

    #[test]
    fn never_scales_below_min_size() {
        let mut window = ScalingWindow::default();
        let c = cfg();
        for _ in 0..5 {
            assert_eq!(window.sample(0.0, 0, 1, &c), ScalingDecision::None);
        }
    }

    #[test]
    fn never_scales_above_max_size() {
        let mut window = ScalingWindow::default();
        let c = cfg();
        for _ in 0..5 {
            assert_eq!(window.sample(1.0, 5, 10, &c), ScalingDecision::None);
        }
    }
}
