use std::{fmt, time::Duration};

const MIB: i64 = 1024 * 1024;

/// One completed epoch's measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochRecord {
    pub epoch: usize,
    pub duration: Duration,
    pub mem_delta_bytes: i64,
}

/// Append-only per-run trend of `(epoch, duration, memory delta)` rows.
///
/// The `Display` form renders the whole history, so printing it after every
/// epoch shows a reader watching live output the running trend instead of just
/// the latest row.
#[derive(Debug, Default)]
pub struct TrendTable {
    records: Vec<EpochRecord>,
}

impl TrendTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record. Records are never mutated after this.
    ///
    /// # Panics
    /// If `record.epoch` is not the next contiguous epoch index.
    pub fn push(&mut self, record: EpochRecord) {
        assert_eq!(
            record.epoch,
            self.records.len(),
            "epoch records must be appended in contiguous order"
        );
        self.records.push(record);
    }

    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl fmt::Display for TrendTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "epoch;duration[ms];gpuMem[MiB]")?;
        for record in &self.records {
            writeln!(
                f,
                "{};{};{}",
                record.epoch,
                record.duration.as_millis(),
                record.mem_delta_bytes / MIB
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_reprints_full_history() {
        let mut trend = TrendTable::new();
        trend.push(EpochRecord {
            epoch: 0,
            duration: Duration::from_millis(1200),
            mem_delta_bytes: 512 * MIB,
        });
        trend.push(EpochRecord {
            epoch: 1,
            duration: Duration::from_millis(1180),
            mem_delta_bytes: -3 * MIB,
        });

        assert_eq!(
            trend.to_string(),
            "epoch;duration[ms];gpuMem[MiB]\n0;1200;512\n1;1180;-3\n"
        );
    }

    #[test]
    fn sub_mib_deltas_truncate_toward_zero() {
        let mut trend = TrendTable::new();
        trend.push(EpochRecord {
            epoch: 0,
            duration: Duration::ZERO,
            mem_delta_bytes: MIB - 1,
        });

        assert_eq!(trend.to_string(), "epoch;duration[ms];gpuMem[MiB]\n0;0;0\n");
    }

    #[test]
    #[should_panic(expected = "contiguous order")]
    fn out_of_order_push_panics() {
        let mut trend = TrendTable::new();
        trend.push(EpochRecord {
            epoch: 1,
            duration: Duration::ZERO,
            mem_delta_bytes: 0,
        });
    }
}
