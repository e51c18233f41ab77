use crate::Result;
use crate::projection::Projection;
use crate::record::Record;

use super::row_to_record;

/// Iterator that yields batches of records from a layer.
///
/// Each call to `next()` runs one `LIMIT ... OFFSET ?` query and returns up to
/// `batch_size` records, so a layer is never held in memory as a whole.
///
/// A row that cannot be decoded (a broken geometry blob, say) is an `Err`
/// entry inside its batch; only a failed query ends the iteration.
pub struct GpkgRecordBatchIterator<'a> {
    pub(super) stmt: rusqlite::Statement<'a>,
    pub(super) projection: Projection,
    pub(super) batch_size: u32,
    pub(super) offset: u32,
    pub(super) end_or_invalid_state: bool,
}

impl GpkgRecordBatchIterator<'_> {
    fn fetch(&mut self) -> Result<Vec<Result<Record>>> {
        let mut records = Vec::with_capacity(self.batch_size as usize);
        let mut rows = self.stmt.query([self.offset])?;
        while let Some(row) = rows.next()? {
            let row_number = self.offset as usize + records.len() + 1;
            records.push(row_to_record(row, row_number, &self.projection));
        }
        Ok(records)
    }
}

impl Iterator for GpkgRecordBatchIterator<'_> {
    type Item = Result<Vec<Result<Record>>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.end_or_invalid_state {
            return None;
        }

        let records = match self.fetch() {
            Ok(records) => records,
            Err(e) => {
                // A failed page leaves the offset unknown; stop here.
                self.end_or_invalid_state = true;
                return Some(Err(e));
            }
        };

        // If the result is less than the batch size, it means it reached the end.
        let result_size = records.len();
        if result_size < self.batch_size as usize {
            self.end_or_invalid_state = true;
            if records.is_empty() {
                return None;
            }
        }

        self.offset += result_size as u32;

        Some(Ok(records))
    }
}
