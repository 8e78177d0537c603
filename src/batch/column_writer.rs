use super::Batch;
use crate::error::ChwireError;
use crate::transport::Transport;
use crate::value::Value;

/// Column-wise access to a batch.
///
/// Rows appended this way are only checked for equal column lengths at
/// flush time. An index past the last column makes every call fail with
/// `ColumnIndexOutOfRange`, which poisons the batch like any other error.
pub struct ColumnWriter<'b, T: Transport> {
    batch: &'b mut Batch<T>,
    index: usize,
}

impl<'b, T: Transport> ColumnWriter<'b, T> {
    pub(super) fn new(batch: &'b mut Batch<T>, index: usize) -> Self {
        Self { batch, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The column name, or `None` for an out-of-range index.
    pub fn name(&self) -> Option<&str> {
        self.batch
            .staging
            .columns()
            .get(self.index)
            .map(|c| c.name.as_str())
    }

    /// Appends several rows to this column, all or none.
    pub fn append<I, V>(&mut self, values: I) -> Result<(), ChwireError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.batch.append_column(self.index, &values)
    }

    pub fn append_row(&mut self, value: impl Into<Value>) -> Result<(), ChwireError> {
        self.batch.append_column(self.index, &[value.into()])
    }
}
