//! Fixed-capacity, FIFO-evicting time series

use crate::models::{MetricHistoryPoint, NetworkHistoryPoint};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Points carrying a timestamp
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
    fn set_timestamp(&mut self, timestamp: DateTime<Utc>);
}

impl Timestamped for NetworkHistoryPoint {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.timestamp = timestamp;
    }
}

impl Timestamped for MetricHistoryPoint {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.timestamp = timestamp;
    }
}

/// Ordered series holding at most `max_points` points; the newest survive
#[derive(Debug, Clone)]
pub struct BoundedSeries<T> {
    points: VecDeque<T>,
    max_points: usize,
}

impl<T: Timestamped + Clone> BoundedSeries<T> {
    pub fn with_capacity(max_points: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(max_points.min(1024)),
            max_points,
        }
    }

    /// Append a point, evicting the oldest when full. A point older than the
    /// current tail is clamped to the tail's timestamp so the series never
    /// goes backwards.
    pub fn push(&mut self, mut point: T) {
        if self.max_points == 0 {
            return;
        }

        if let Some(last) = self.points.back() {
            if point.timestamp() < last.timestamp() {
                point.set_timestamp(last.timestamp());
            }
        }

        while self.points.len() >= self.max_points {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    /// Copy of the points, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.points.iter().cloned().collect()
    }
}
