use schemaless_query::Value;
use schemaless_store::Connection;
use tracing::info;

use crate::engine::Engine;
use crate::entity::Entity;
use crate::error::EngineError;

const DEFAULT_BATCH_SIZE: usize = 100;

/// Summary of a [`sweep`] run, reported even when `process_row` stops the
/// walk early with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub rows_processed: u64,
    pub last_added_id: i64,
}

/// Paginated forward scan over the entities table by `added_id`. Restartable:
/// pass the `added_id` of the last row processed by a previous run as
/// `start_after` to pick up immediately after it.
///
/// `process_row` is called once per entity in ascending `added_id` order. An
/// `Err` returned from it stops the sweep; the summary accumulated so far is
/// still returned alongside the error so a caller can resume from
/// `last_added_id`.
pub fn sweep<C: Connection>(
    engine: &Engine<C>,
    start_after: i64,
    batch_size: Option<usize>,
    mut process_row: impl FnMut(i64, Entity) -> Result<(), EngineError>,
) -> (SweepSummary, Result<(), EngineError>) {
    let batch_size = batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1);
    let mut cursor = start_after;
    let mut rows_processed = 0u64;
    let mut last_added_id = start_after;

    loop {
        let sql = format!(
            "SELECT * FROM entities WHERE added_id > ? ORDER BY added_id ASC LIMIT {batch_size}"
        );
        let rows = match engine.connection().query(&sql, &[Value::Int(cursor)]) {
            Ok(rows) => rows,
            Err(e) => {
                return (
                    SweepSummary {
                        rows_processed,
                        last_added_id,
                    },
                    Err(e.into()),
                );
            }
        };
        if rows.is_empty() {
            break;
        }

        for row in &rows {
            let added_id = match engine.added_id_of(row) {
                Ok(id) => id,
                Err(e) => {
                    return (
                        SweepSummary {
                            rows_processed,
                            last_added_id,
                        },
                        Err(e),
                    );
                }
            };
            let entity = match engine.entity_from_row(row) {
                Ok(e) => e,
                Err(e) => {
                    return (
                        SweepSummary {
                            rows_processed,
                            last_added_id,
                        },
                        Err(e),
                    );
                }
            };

            if let Err(e) = process_row(added_id, entity) {
                return (
                    SweepSummary {
                        rows_processed,
                        last_added_id,
                    },
                    Err(e),
                );
            }

            rows_processed += 1;
            last_added_id = added_id;
            cursor = added_id;
        }

        info!(rows_processed, last_added_id, "sweep batch complete");

        if rows.len() < batch_size {
            break;
        }
    }

    (
        SweepSummary {
            rows_processed,
            last_added_id,
        },
        Ok(()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;
    use schemaless_store::SqliteConnection;

    fn engine() -> Engine<SqliteConnection> {
        let conn = SqliteConnection::open_in_memory().unwrap();
        Engine::new(conn, EngineOptions::default()).unwrap()
    }

    #[test]
    fn sweep_visits_every_row_in_order() {
        let engine = engine();
        for i in 0..5 {
            let mut e = Entity::new();
            e.set("n", Value::Int(i));
            engine.put(e, None).unwrap();
        }

        let mut seen = Vec::new();
        let (summary, result) = sweep(&engine, 0, Some(2), |added_id, entity| {
            seen.push((added_id, entity.get("n").cloned()));
            Ok(())
        });

        assert!(result.is_ok());
        assert_eq!(summary.rows_processed, 5);
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[0].1, Some(Value::Int(0)));
        assert_eq!(seen[4].1, Some(Value::Int(4)));
    }

    #[test]
    fn sweep_can_resume_from_a_cursor() {
        let engine = engine();
        for i in 0..3 {
            let mut e = Entity::new();
            e.set("n", Value::Int(i));
            engine.put(e, None).unwrap();
        }

        let (first, _) = sweep(&engine, 0, Some(1), |_, _| Ok(()));
        assert_eq!(first.rows_processed, 1);

        let mut seen = 0;
        let (second, result) = sweep(&engine, first.last_added_id, Some(100), |_, _| {
            seen += 1;
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(seen, 2);
        assert_eq!(second.rows_processed, 2);
    }

    #[test]
    fn sweep_reports_summary_even_on_error() {
        let engine = engine();
        for i in 0..3 {
            let mut e = Entity::new();
            e.set("n", Value::Int(i));
            engine.put(e, None).unwrap();
        }

        let (summary, result) = sweep(&engine, 0, Some(100), |_, entity| {
            if entity.get("n") == Some(&Value::Int(1)) {
                Err(EngineError::InternalError("boom".to_string()))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert_eq!(summary.rows_processed, 1);
    }
}
