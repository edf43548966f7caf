//! Change notifications from a [`crate::table::TableModel`].
//!
//! Register an [`Arc<dyn TableObserver>`] with
//! [`crate::table::TableModel::subscribe`] to receive the canonical form
//! after every committed mutation. Emissions happen synchronously, inside the
//! mutating call, in the order mutations were applied. A rejected mutation
//! emits nothing.
//!
//! Observers that also need the header (a table with no rows still has
//! columns) override [`TableObserver::on_snapshot`] instead.
//!
//! # Example
//!
//! ```rust
//! use pic2csv::table::{Record, TableModel, TableObserver};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct LastSeen(Mutex<Vec<Record>>);
//!
//! impl TableObserver for LastSeen {
//!     fn on_table_changed(&self, rows: &[Record]) {
//!         *self.0.lock().unwrap() = rows.to_vec();
//!     }
//! }
//!
//! let seen = Arc::new(LastSeen::default());
//! let mut model = TableModel::new(Vec::new());
//! model.subscribe(seen.clone());
//! model.add_column(Some("Name")).unwrap();
//! model.add_row();
//! assert_eq!(seen.0.lock().unwrap().len(), 1);
//! ```

use crate::table::{Record, TableSnapshot};
use std::sync::Arc;

/// Receives the canonical form of a table after each committed change.
///
/// Implementations must be `Send + Sync` so a model can be moved into a
/// spawned task by its owner.
pub trait TableObserver: Send + Sync {
    fn on_table_changed(&self, _rows: &[Record]) {}

    /// Same emission, with the column list. Called right after
    /// [`TableObserver::on_table_changed`].
    fn on_snapshot(&self, _snapshot: &TableSnapshot) {}
}

/// Convenience alias for the type stored by [`crate::table::TableModel`].
pub type TableObserverRef = Arc<dyn TableObserver>;

impl<F> TableObserver for F
where
    F: Fn(&[Record]) + Send + Sync,
{
    fn on_table_changed(&self, rows: &[Record]) {
        self(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn closures_are_observers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let observer: TableObserverRef = Arc::new(move |rows: &[Record]| {
            counter.fetch_add(rows.len(), Ordering::SeqCst);
        });

        observer.on_table_changed(&[Record::new(), Record::new()]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn snapshot_observers_get_the_header_of_an_empty_table() {
        use crate::table::TableModel;
        use std::sync::Mutex;

        #[derive(Default)]
        struct Headers(Mutex<Vec<Vec<String>>>);
        impl TableObserver for Headers {
            fn on_snapshot(&self, snapshot: &TableSnapshot) {
                self.0.lock().unwrap().push(snapshot.columns.clone());
            }
        }

        let headers = Arc::new(Headers::default());
        let mut model = TableModel::new(Vec::new());
        model.subscribe(headers.clone());
        model.add_column(Some("A")).unwrap();
        model.rename_column("A", "Alpha").unwrap();

        assert_eq!(
            *headers.0.lock().unwrap(),
            vec![vec!["A".to_string()], vec!["Alpha".to_string()]]
        );
    }
}
