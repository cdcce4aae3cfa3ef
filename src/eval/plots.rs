use anyhow::Result;
use plotters::prelude::*;
use std::path::Path;

use crate::data::Label;
use crate::eval::confusion::ConfusionMatrix;
use crate::training::TrainingHistory;

fn heat_color(rate: f64) -> RGBColor {
    // White for 0 up to a saturated blue for 1.
    let clamped = rate.clamp(0.0, 1.0);
    let r = (255.0 * (1.0 - clamped * 0.8)) as u8;
    let g = (255.0 * (1.0 - clamped * 0.6)) as u8;
    RGBColor(r, g, 255)
}

/// Renders the row-normalized confusion matrix as a heatmap PNG, one cell per
/// (true class, predicted class) with its rate printed inside.
pub fn render_confusion_heatmap(matrix: &ConfusionMatrix, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let normalized = matrix.normalized();
    let n = Label::COUNT;

    let root = BitMapBackend::new(path, (640, 560)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| anyhow::anyhow!("backend error: {e}"))?;

    {
        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .caption("Confusion matrix (row-normalized)", ("sans-serif", 24.0))
            .set_label_area_size(LabelAreaPosition::Left, 90)
            .set_label_area_size(LabelAreaPosition::Bottom, 50)
            .build_cartesian_2d(0.0..n as f64, 0.0..n as f64)
            .map_err(|e| anyhow::anyhow!("chart build error: {e}"))?;

        chart
            .configure_mesh()
            .x_desc("predicted")
            .y_desc("true")
            .x_labels(n)
            .y_labels(n)
            .x_label_formatter(&|v| label_at(*v))
            .y_label_formatter(&|v| label_at(n as f64 - 1.0 - *v))
            .disable_mesh()
            .draw()
            .map_err(|e| anyhow::anyhow!("mesh error: {e}"))?;

        for truth in Label::ALL {
            for predicted in Label::ALL {
                let rate = normalized[truth.index()][predicted.index()];
                // Row 0 at the top of the plot.
                let x = predicted.index() as f64;
                let y = (n - 1 - truth.index()) as f64;

                let cell = Rectangle::new(
                    [(x, y), (x + 1.0, y + 1.0)],
                    heat_color(rate).filled(),
                );
                chart
                    .draw_series(std::iter::once(cell))
                    .map_err(|e| anyhow::anyhow!("draw error: {e}"))?;

                let text = Text::new(
                    format!("{rate:.2}"),
                    (x + 0.42, y + 0.5),
                    ("sans-serif", 22.0).into_font().color(&BLACK),
                );
                chart
                    .draw_series(std::iter::once(text))
                    .map_err(|e| anyhow::anyhow!("draw error: {e}"))?;
            }
        }
    }

    root.present()
        .map_err(|e| anyhow::anyhow!("render error: {e}"))?;
    log::info!("wrote confusion heatmap to {}", path.display());
    Ok(())
}

fn label_at(v: f64) -> String {
    let idx = v.floor() as usize;
    Label::from_index(idx)
        .map(|l| l.to_string())
        .unwrap_or_default()
}

/// Renders train/validation loss and accuracy curves over epochs.
pub fn render_history(history: &TrainingHistory, path: &Path) -> Result<()> {
    if history.is_empty() {
        return Err(anyhow::anyhow!("no epochs recorded, nothing to plot"));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let records = history.records();
    let max_loss = records
        .iter()
        .flat_map(|r| [r.loss, r.val_loss])
        .fold(f32::MIN, f32::max)
        .max(1e-6);
    let epochs = records.len();

    // Accuracies live in [0, 1]; share the axis with the losses.
    let y_max = (max_loss.max(1.0) * 1.1) as f64;

    let root = BitMapBackend::new(path, (720, 480)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| anyhow::anyhow!("backend error: {e}"))?;

    {
        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .caption("Training curves", ("sans-serif", 24.0))
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 50)
            .build_cartesian_2d(1.0..epochs.max(2) as f64, 0.0..y_max)
            .map_err(|e| anyhow::anyhow!("chart build error: {e}"))?;

        chart
            .configure_mesh()
            .x_desc("epoch")
            .y_desc("loss / accuracy")
            .draw()
            .map_err(|e| anyhow::anyhow!("mesh error: {e}"))?;

        chart
            .draw_series(LineSeries::new(
                records.iter().map(|r| (r.epoch as f64, r.loss as f64)),
                &BLUE,
            ))
            .map_err(|e| anyhow::anyhow!("draw error: {e}"))?
            .label("train loss")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], BLUE));

        chart
            .draw_series(LineSeries::new(
                records.iter().map(|r| (r.epoch as f64, r.val_loss as f64)),
                &RED,
            ))
            .map_err(|e| anyhow::anyhow!("draw error: {e}"))?
            .label("val loss")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], RED));

        chart
            .draw_series(LineSeries::new(
                records.iter().map(|r| (r.epoch as f64, r.accuracy as f64)),
                &GREEN,
            ))
            .map_err(|e| anyhow::anyhow!("draw error: {e}"))?
            .label("train acc")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], GREEN));

        chart
            .draw_series(LineSeries::new(
                records.iter().map(|r| (r.epoch as f64, r.val_accuracy as f64)),
                &MAGENTA,
            ))
            .map_err(|e| anyhow::anyhow!("draw error: {e}"))?
            .label("val acc")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], MAGENTA));

        chart
            .configure_series_labels()
            .border_style(BLACK)
            .background_style(WHITE.mix(0.8))
            .draw()
            .map_err(|e| anyhow::anyhow!("legend error: {e}"))?;
    }

    root.present()
        .map_err(|e| anyhow::anyhow!("render error: {e}"))?;
    log::info!("wrote training curves to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::history::EpochRecord;
    use tempfile::TempDir;

    #[test]
    fn heatmap_file_is_created() {
        let pairs = [
            (Label::Normal, Label::Normal),
            (Label::Pneumonia, Label::Pneumonia),
            (Label::Pneumonia, Label::Normal),
        ];
        let cm = ConfusionMatrix::from_predictions(&pairs);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("confusion.png");
        render_confusion_heatmap(&cm, &path).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn history_plot_requires_at_least_one_epoch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("curves.png");
        assert!(render_history(&TrainingHistory::new(), &path).is_err());

        let mut history = TrainingHistory::new();
        for epoch in 1..=3 {
            history.push(EpochRecord {
                epoch,
                loss: 1.0 / epoch as f32,
                accuracy: 0.5,
                val_loss: 1.2 / epoch as f32,
                val_accuracy: 0.5,
            });
        }
        render_history(&history, &path).unwrap();
        assert!(path.is_file());
    }
}
