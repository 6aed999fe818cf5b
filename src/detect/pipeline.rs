//! Batch scoring: runs the detection stages in order over one upload.

use tracing::{debug, info};

use crate::config::{FeatureConfig, ModelConfig};
use crate::detect::comment::Comment;
use crate::detect::encode::GroupEncoders;
use crate::detect::features::{self, EngineeredRow};
use crate::detect::model::{BoostingParams, Classifier, Evaluation, FeatureVector};
use crate::detect::rules::DeviationRule;
use crate::detect::split::HoldOutSplit;
use crate::detect::{DetectError, ScoredBatch, ScoredRow};
use crate::ingest::{Batch, ReconciliationRecord};

fn feature_vector(record: &ReconciliationRecord, row: &EngineeredRow) -> FeatureVector {
    [
        record.balance_difference,
        row.lag1,
        row.lag2,
        row.rolling_mean,
        row.rolling_std,
        f64::from(row.codes.account),
        f64::from(row.codes.primary_account),
        f64::from(row.codes.secondary_account),
        f64::from(row.codes.au),
    ]
}

/// Score one batch end to end:
/// 1. Build lag / rolling features per group, in date order
/// 2. Label rows with the deviation rule
/// 3. Encode the grouping keys
/// 4. Train a classifier on the training split, report the hold-out split
/// 5. Predict every row and attach comments
///
/// Output rows follow the pipeline's group/date order.
pub fn detect_anomalies(
    batch: &Batch,
    features_cfg: &FeatureConfig,
    model_cfg: &ModelConfig,
) -> Result<ScoredBatch, DetectError> {
    let records = &batch.records;
    info!(rows = records.len(), "Starting anomaly detection");

    // 1. Features
    let mut rows = features::build(records, features_cfg.window, features_cfg.history_policy);
    if rows.is_empty() {
        info!("no rows with sufficient history, nothing to score");
        return Ok(ScoredBatch {
            input_headers: batch.headers.clone(),
            rows: Vec::new(),
        });
    }

    // 2. Rule labels
    let rule = DeviationRule::new(features_cfg.deviation_multiplier);
    for row in rows.iter_mut() {
        let record = &records[row.source];
        row.rule_anomaly = rule.is_anomaly(
            &record.match_status,
            record.balance_difference,
            row.rolling_mean,
            row.rolling_std,
        );
    }

    // 3. Categorical codes, fitted on the whole batch
    let (encoders, codes) = GroupEncoders::fit_transform(records);
    for row in rows.iter_mut() {
        row.codes = codes[row.source];
    }
    debug!(
        accounts = encoders.account.len(),
        primary_accounts = encoders.primary_account.len(),
        secondary_accounts = encoders.secondary_account.len(),
        aus = encoders.au.len(),
        "encoded grouping keys"
    );

    let x: Vec<FeatureVector> = rows
        .iter()
        .map(|row| feature_vector(&records[row.source], row))
        .collect();
    let y: Vec<bool> = rows.iter().map(|row| row.rule_anomaly).collect();

    // 4. Train on the training split
    let split = HoldOutSplit::new(rows.len(), model_cfg.test_fraction, model_cfg.seed);
    let train_x: Vec<FeatureVector> = split.train.iter().map(|&i| x[i]).collect();
    let train_y: Vec<bool> = split.train.iter().map(|&i| y[i]).collect();
    let classifier = Classifier::train(
        &train_x,
        &train_y,
        &BoostingParams::from(model_cfg),
        features_cfg.single_class,
    )?;

    let threshold = model_cfg.decision_threshold;
    if !split.test.is_empty() {
        let truth: Vec<bool> = split.test.iter().map(|&i| y[i]).collect();
        let predicted: Vec<bool> = split
            .test
            .iter()
            .map(|&i| classifier.predict(&x[i], threshold))
            .collect();
        let eval = Evaluation::compute(&truth, &predicted);
        info!(
            support = eval.support,
            positives = eval.positives,
            accuracy = eval.accuracy,
            precision = eval.precision,
            recall = eval.recall,
            f1 = eval.f1,
            "hold-out evaluation"
        );
    }

    // 5. Predict every row, training rows included
    let scored: Vec<ScoredRow> = rows
        .iter()
        .zip(&x)
        .map(|(row, features)| {
            let record = &records[row.source];
            let predicted_anomaly = classifier.predict(features, threshold);
            let comment = Comment::synthesize(
                predicted_anomaly,
                record.is_break(),
                record.balance_difference,
                row.rolling_mean,
                row.rolling_std,
                features_cfg.deviation_multiplier,
            );
            ScoredRow {
                cells: batch.cells[row.source].clone(),
                predicted_anomaly,
                comment,
            }
        })
        .collect();

    let result = ScoredBatch {
        input_headers: batch.headers.clone(),
        rows: scored,
    };
    info!(
        rows = result.rows.len(),
        rule_anomalies = y.iter().filter(|&&v| v).count(),
        predicted_anomalies = result.anomaly_count(),
        "Anomaly detection complete"
    );
    Ok(result)
}
