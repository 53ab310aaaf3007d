//! Repository Implementation

use crate::StorageError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Largest page returned by detection queries
pub const MAX_DETECTION_QUERY: usize = 1000;
/// Largest page returned by alert queries
pub const MAX_ALERT_QUERY: usize = 500;

/// Logging collaborator the pipeline writes to
///
/// Callers treat both operations as fire-and-forget: an error is logged at
/// the call site and never changes the caller's control flow.
pub trait DetectionLog: Send + Sync {
    fn log_detection(
        &self,
        class_name: &str,
        confidence: f64,
        bbox: [i32; 4],
        frame_number: u64,
        source: &str,
        track_id: Option<i64>,
    ) -> Result<(), StorageError>;

    fn log_alert(&self, alert_type: &str, message: &str, class_name: &str, count: usize) -> Result<(), StorageError>;
}

/// Logged detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub class_name: String,
    pub confidence: f64,
    pub bbox: [i32; 4],
    pub frame_number: u64,
    pub source: String,
    pub track_id: Option<i64>,
}

/// Logged alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub alert_type: String,
    pub message: String,
    pub class_name: String,
    pub count: usize,
}

/// Aggregate over every retained detection of one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassStatistics {
    pub class_name: String,
    pub count: usize,
    pub avg_confidence: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
}

/// Retention limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub max_detection_records: usize,
    pub max_alert_records: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_detection_records: 100_000,
            max_alert_records: 10_000,
        }
    }
}

/// Repository for data access (in-memory)
pub struct Repository {
    detections: Mutex<VecDeque<DetectionRecord>>,
    alerts: Mutex<VecDeque<AlertRecord>>,
    retention: RetentionConfig,
    next_detection_id: Mutex<i64>,
    next_alert_id: Mutex<i64>,
}

impl Repository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        Self::with_retention(RetentionConfig::default())
    }

    pub fn with_retention(retention: RetentionConfig) -> Self {
        info!(
            "Creating in-memory repository (detections: {}, alerts: {})",
            retention.max_detection_records, retention.max_alert_records
        );
        Self {
            detections: Mutex::new(VecDeque::with_capacity(1024)),
            alerts: Mutex::new(VecDeque::with_capacity(128)),
            retention,
            next_detection_id: Mutex::new(1),
            next_alert_id: Mutex::new(1),
        }
    }

    /// Most recent detections, newest first
    pub fn recent_detections(&self, limit: usize) -> Result<Vec<DetectionRecord>, StorageError> {
        let detections = lock(&self.detections)?;
        Ok(detections
            .iter()
            .rev()
            .take(limit.min(MAX_DETECTION_QUERY))
            .cloned()
            .collect())
    }

    /// Per-class aggregates, most frequent class first
    pub fn class_statistics(&self) -> Result<Vec<ClassStatistics>, StorageError> {
        let detections = lock(&self.detections)?;

        let mut by_class: HashMap<&str, (usize, f64, f64, f64)> = HashMap::new();
        for record in detections.iter() {
            let entry = by_class
                .entry(record.class_name.as_str())
                .or_insert((0, 0.0, f64::MAX, f64::MIN));
            entry.0 += 1;
            entry.1 += record.confidence;
            entry.2 = entry.2.min(record.confidence);
            entry.3 = entry.3.max(record.confidence);
        }

        let mut stats: Vec<ClassStatistics> = by_class
            .into_iter()
            .map(|(class_name, (count, sum, min, max))| ClassStatistics {
                class_name: class_name.to_string(),
                count,
                avg_confidence: sum / count as f64,
                min_confidence: min,
                max_confidence: max,
            })
            .collect();
        stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.class_name.cmp(&b.class_name)));
        Ok(stats)
    }

    /// Aggregate for a single class
    pub fn class_details(&self, class_name: &str) -> Result<ClassStatistics, StorageError> {
        self.class_statistics()?
            .into_iter()
            .find(|s| s.class_name == class_name)
            .ok_or(StorageError::NotFound)
    }

    /// Most recent alerts, newest first
    pub fn recent_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>, StorageError> {
        let alerts = lock(&self.alerts)?;
        Ok(alerts.iter().rev().take(limit.min(MAX_ALERT_QUERY)).cloned().collect())
    }

    /// Most recent detections of one class, newest first
    pub fn detections_by_class(&self, class_name: &str, limit: usize) -> Result<Vec<DetectionRecord>, StorageError> {
        let detections = lock(&self.detections)?;
        Ok(detections
            .iter()
            .rev()
            .filter(|r| r.class_name == class_name)
            .take(limit.min(MAX_DETECTION_QUERY))
            .cloned()
            .collect())
    }

    /// Detections at or above `min_confidence`, most confident first
    pub fn high_confidence_detections(
        &self,
        min_confidence: f64,
        limit: usize,
    ) -> Result<Vec<DetectionRecord>, StorageError> {
        let detections = lock(&self.detections)?;
        let mut matching: Vec<DetectionRecord> = detections
            .iter()
            .filter(|r| r.confidence >= min_confidence)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        matching.truncate(limit.min(MAX_DETECTION_QUERY));
        Ok(matching)
    }

    /// Detections logged within `[start, end]`, oldest first
    pub fn detections_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DetectionRecord>, StorageError> {
        let detections = lock(&self.detections)?;
        Ok(detections
            .iter()
            .filter(|r| r.timestamp >= start && r.timestamp <= end)
            .cloned()
            .collect())
    }

    /// Drop records older than `days`, returning how many were removed
    pub fn clear_old_data(&self, days: i64) -> Result<usize, StorageError> {
        let cutoff = Utc::now() - Duration::days(days);

        let mut detections = lock(&self.detections)?;
        let before = detections.len();
        detections.retain(|r| r.timestamp >= cutoff);
        let mut removed = before - detections.len();
        drop(detections);

        let mut alerts = lock(&self.alerts)?;
        let before = alerts.len();
        alerts.retain(|r| r.timestamp >= cutoff);
        removed += before - alerts.len();

        info!("Cleared {} records older than {} days", removed, days);
        Ok(removed)
    }

    pub fn detection_count(&self) -> usize {
        self.detections.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.lock().map(|a| a.len()).unwrap_or(0)
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        if let Ok(mut detections) = self.detections.lock() {
            detections.clear();
        }
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.clear();
        }
    }

    fn next_id(counter: &Mutex<i64>) -> Result<i64, StorageError> {
        let mut id = lock(counter)?;
        let current = *id;
        *id += 1;
        Ok(current)
    }
}

impl DetectionLog for Repository {
    fn log_detection(
        &self,
        class_name: &str,
        confidence: f64,
        bbox: [i32; 4],
        frame_number: u64,
        source: &str,
        track_id: Option<i64>,
    ) -> Result<(), StorageError> {
        if class_name.is_empty() {
            return Err(StorageError::InvalidRecord("empty class name".to_string()));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(StorageError::InvalidRecord(format!("confidence {} out of range", confidence)));
        }

        let record = DetectionRecord {
            id: Self::next_id(&self.next_detection_id)?,
            timestamp: Utc::now(),
            class_name: class_name.to_string(),
            confidence,
            bbox,
            frame_number,
            source: source.to_string(),
            track_id,
        };

        let mut detections = lock(&self.detections)?;
        while detections.len() >= self.retention.max_detection_records.max(1) {
            detections.pop_front();
        }
        detections.push_back(record);
        Ok(())
    }

    fn log_alert(&self, alert_type: &str, message: &str, class_name: &str, count: usize) -> Result<(), StorageError> {
        if alert_type.is_empty() {
            return Err(StorageError::InvalidRecord("empty alert type".to_string()));
        }

        let record = AlertRecord {
            id: Self::next_id(&self.next_alert_id)?,
            timestamp: Utc::now(),
            alert_type: alert_type.to_string(),
            message: message.to_string(),
            class_name: class_name.to_string(),
            count,
        };
        debug!("Alert logged: {}", record.message);

        let mut alerts = lock(&self.alerts)?;
        while alerts.len() >= self.retention.max_alert_records.max(1) {
            alerts.pop_front();
        }
        alerts.push_back(record);
        Ok(())
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
}
