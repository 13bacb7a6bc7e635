//! Linear-in-time extrapolation of accepted solutions.
//!
//! Keeps the two most recent `(time, solution)` pairs and predicts the
//! solution at a new time. With fewer than two entries the prediction
//! degrades to the newest entry, or to zero when the history is empty.

use std::collections::VecDeque;

use ndarray::{Array2, Zip};

/// Bounded history of accepted solutions, newest first.
#[derive(Debug, Clone, Default)]
pub struct Extrapolation {
    history: VecDeque<(f64, Array2<f64>)>,
}

impl Extrapolation {
    const DEPTH: usize = 2;

    pub fn new() -> Self {
        Extrapolation {
            history: VecDeque::with_capacity(Self::DEPTH),
        }
    }

    /// Number of stored entries (0, 1 or 2).
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Newest accepted solution, if any.
    pub fn head(&self) -> Option<&Array2<f64>> {
        self.history.front().map(|(_, x)| x)
    }

    /// Time of the newest accepted solution.
    pub fn head_time(&self) -> Option<f64> {
        self.history.front().map(|(t, _)| *t)
    }

    /// Write the predicted solution at time `t` into `out`.
    ///
    /// Two entries at distinct times give the linear prediction
    /// `x₀ + (t − t₀)/(t₀ − t₁)·(x₀ − x₁)`; coinciding times fall back to
    /// the newest entry.
    pub fn extrapolate(&self, t: f64, out: &mut Array2<f64>) {
        match (self.history.front(), self.history.get(1)) {
            (Some((t0, x0)), Some((t1, x1))) if t0 != t1 => {
                let s = (t - t0) / (t0 - t1);
                Zip::from(out)
                    .and(x0)
                    .and(x1)
                    .for_each(|o, &a, &b| *o = a + s * (a - b));
            }
            (Some((_, x0)), _) => out.assign(x0),
            (None, _) => out.fill(0.0),
        }
    }

    /// Push a newly accepted solution, dropping the oldest beyond depth 2.
    ///
    /// An entry at the same time as the newest one replaces it.
    pub fn update(&mut self, t: f64, x: &Array2<f64>) {
        if let Some((t0, x0)) = self.history.front_mut() {
            if *t0 == t {
                x0.assign(x);
                return;
            }
        }
        let slot = if self.history.len() == Self::DEPTH {
            self.history.pop_back().map(|(_, mut buf)| {
                buf.assign(x);
                buf
            })
        } else {
            None
        };
        self.history.push_front((t, slot.unwrap_or_else(|| x.clone())));
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_predicts_zero() {
        let ex = Extrapolation::new();
        let mut out = Array2::from_elem((3, 3), 9.0);
        ex.extrapolate(1.0, &mut out);
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_single_entry_is_copied() {
        let mut ex = Extrapolation::new();
        ex.update(0.0, &Array2::from_elem((2, 2), 4.0));
        let mut out = Array2::zeros((2, 2));
        ex.extrapolate(0.5, &mut out);
        assert!(out.iter().all(|&v| v == 4.0));
    }

    #[test]
    fn test_linear_history_is_exact() {
        let mut ex = Extrapolation::new();
        ex.update(1.0, &Array2::from_elem((2, 3), 3.0)); // x = 1 + 2t
        ex.update(2.0, &Array2::from_elem((2, 3), 5.0));
        let mut out = Array2::zeros((2, 3));
        ex.extrapolate(3.5, &mut out);
        assert!(out.iter().all(|&v| (v - 8.0).abs() < 1e-12));
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut ex = Extrapolation::new();
        for k in 0..5 {
            ex.update(k as f64, &Array2::from_elem((1, 1), k as f64));
        }
        assert_eq!(ex.len(), 2);
        assert_eq!(ex.head_time(), Some(4.0));
        assert_eq!(ex.head().map(|h| h[[0, 0]]), Some(4.0));
    }

    #[test]
    fn test_same_time_replaces_head() {
        let mut ex = Extrapolation::new();
        ex.update(0.0, &Array2::from_elem((1, 1), 1.0));
        ex.update(0.0, &Array2::from_elem((1, 1), 2.0));
        assert_eq!(ex.len(), 1);
        let mut out = Array2::zeros((1, 1));
        ex.extrapolate(7.0, &mut out);
        assert_eq!(out[[0, 0]], 2.0);
    }
}
