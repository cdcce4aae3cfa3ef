use std::fmt;

use crate::data::Label;

/// 2x2 confusion matrix of raw counts, `matrix[true][predicted]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfusionMatrix {
    matrix: [[usize; Label::COUNT]; Label::COUNT],
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self {
            matrix: [[0; Label::COUNT]; Label::COUNT],
        }
    }

    pub fn from_predictions(pairs: &[(Label, Label)]) -> Self {
        let mut cm = Self::new();
        for (truth, predicted) in pairs {
            cm.record(*truth, *predicted);
        }
        cm
    }

    pub fn record(&mut self, truth: Label, predicted: Label) {
        self.matrix[truth.index()][predicted.index()] += 1;
    }

    pub fn get(&self, truth: Label, predicted: Label) -> usize {
        self.matrix[truth.index()][predicted.index()]
    }

    /// Number of samples whose true class is `label`.
    pub fn support(&self, label: Label) -> usize {
        self.matrix[label.index()].iter().sum()
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: usize = Label::ALL.iter().map(|l| self.get(*l, *l)).sum();
        correct as f64 / total as f64
    }

    /// Recall for one class: the diagonal rate of its normalized row.
    pub fn recall(&self, label: Label) -> f64 {
        let support = self.support(label);
        if support == 0 {
            return 0.0;
        }
        self.get(label, label) as f64 / support as f64
    }

    /// Row-normalized rates: each row is the prediction distribution
    /// conditioned on the true class and sums to 1. A class with zero true
    /// samples has no distribution to normalize; its row is reported as all
    /// zeros rather than letting a division by zero produce NaN.
    pub fn normalized(&self) -> [[f64; Label::COUNT]; Label::COUNT] {
        let mut out = [[0.0; Label::COUNT]; Label::COUNT];
        for truth in Label::ALL {
            let support = self.support(truth);
            if support == 0 {
                continue;
            }
            for predicted in Label::ALL {
                out[truth.index()][predicted.index()] =
                    self.get(truth, predicted) as f64 / support as f64;
            }
        }
        out
    }
}

impl Default for ConfusionMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>18} {:>10} {:>10}", "", "pred NORM", "pred PNEU")?;
        for truth in Label::ALL {
            write!(f, "{:>18}", format!("true {truth}"))?;
            for predicted in Label::ALL {
                write!(f, " {:>10}", self.get(truth, predicted))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_land_in_true_by_predicted_cells() {
        let pairs = [
            (Label::Normal, Label::Normal),
            (Label::Normal, Label::Pneumonia),
            (Label::Pneumonia, Label::Pneumonia),
            (Label::Pneumonia, Label::Pneumonia),
        ];
        let cm = ConfusionMatrix::from_predictions(&pairs);
        assert_eq!(cm.get(Label::Normal, Label::Normal), 1);
        assert_eq!(cm.get(Label::Normal, Label::Pneumonia), 1);
        assert_eq!(cm.get(Label::Pneumonia, Label::Normal), 0);
        assert_eq!(cm.get(Label::Pneumonia, Label::Pneumonia), 2);
        assert_eq!(cm.total(), 4);
        assert!((cm.accuracy() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn normalized_rows_sum_to_one() {
        let pairs = [
            (Label::Normal, Label::Normal),
            (Label::Normal, Label::Normal),
            (Label::Normal, Label::Pneumonia),
            (Label::Pneumonia, Label::Normal),
            (Label::Pneumonia, Label::Pneumonia),
        ];
        let norm = ConfusionMatrix::from_predictions(&pairs).normalized();
        for row in norm {
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn empty_row_normalizes_to_zeros() {
        // Ten true normals, all predicted normal, no pneumonia samples at
        // all: row 0 is [1, 0] and the unsupported row is all zeros.
        let pairs = vec![(Label::Normal, Label::Normal); 10];
        let norm = ConfusionMatrix::from_predictions(&pairs).normalized();
        assert_eq!(norm[0], [1.0, 0.0]);
        assert_eq!(norm[1], [0.0, 0.0]);
        assert!(norm.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn recall_is_the_diagonal_rate() {
        let pairs = [
            (Label::Pneumonia, Label::Pneumonia),
            (Label::Pneumonia, Label::Pneumonia),
            (Label::Pneumonia, Label::Normal),
            (Label::Normal, Label::Normal),
        ];
        let cm = ConfusionMatrix::from_predictions(&pairs);
        assert!((cm.recall(Label::Pneumonia) - 2.0 / 3.0).abs() < 1e-9);
        assert!((cm.recall(Label::Normal) - 1.0).abs() < 1e-9);
    }
}
