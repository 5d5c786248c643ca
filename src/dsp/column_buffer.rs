use std::fmt;

/// Error raised when writing malformed column data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    RaggedColumns { len: usize, height: usize },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::RaggedColumns { len, height } => write!(
                f,
                "{len} values do not form whole columns of height {height}"
            ),
        }
    }
}

impl std::error::Error for BufferError {}

/// Fixed-capacity ring of spectrogram columns stored column-major.
///
/// Valid data lives at slots `[start, start + len) mod width`; every other
/// slot is stale and must not be displayed. The buffer expects a single
/// writer; readers only observe it between writes.
#[derive(Clone)]
pub struct CircularColumnBuffer {
    data: Vec<f32>,
    width: usize,
    height: usize,
    start: usize,
    len: usize,
    written: u64,
    epoch: u64,
}

impl CircularColumnBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        assert!(
            width > 0 && height > 0,
            "CircularColumnBuffer dimensions must be greater than zero"
        );

        Self {
            data: vec![0.0; width * height],
            width,
            height,
            start: 0,
            len: 0,
            written: 0,
            epoch: 0,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Slot index of the oldest valid column.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.width
    }

    /// Total number of columns ever enqueued since the last clear or resize.
    #[inline]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Bumped whenever storage is reallocated (clear or resize).
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Raw slot storage, `width * height` values, including stale slots.
    #[inline]
    pub fn raw(&self) -> &[f32] {
        &self.data
    }

    /// Raw storage for the slots `[first, first + count)`.
    pub fn slot_range(&self, first: usize, count: usize) -> &[f32] {
        let begin = first.min(self.width) * self.height;
        let end = (first + count).min(self.width) * self.height;
        &self.data[begin..end]
    }

    /// Append columns given as a flat column-major slice. When the buffer
    /// overflows the oldest columns are evicted. Returns the number of
    /// columns evicted.
    pub fn enqueue(&mut self, columns: &[f32]) -> Result<usize, BufferError> {
        if columns.len() % self.height != 0 {
            return Err(BufferError::RaggedColumns {
                len: columns.len(),
                height: self.height,
            });
        }

        let count = columns.len() / self.height;
        if count == 0 {
            return Ok(0);
        }

        // Columns that would be overwritten within this same call are skipped.
        let skipped = count.saturating_sub(self.width);
        for (i, column) in columns
            .chunks_exact(self.height)
            .enumerate()
            .skip(skipped)
        {
            let slot = (self.start + self.len + i) % self.width;
            let offset = slot * self.height;
            self.data[offset..offset + self.height].copy_from_slice(column);
        }

        let overflow = (self.len + count).saturating_sub(self.width);
        if overflow > 0 {
            self.start = (self.start + overflow) % self.width;
            self.len = self.width;
        } else {
            self.len += count;
        }
        self.written += count as u64;

        Ok(overflow)
    }

    /// Column at logical index `index` (0 is the oldest valid column).
    pub fn column(&self, index: usize) -> Option<&[f32]> {
        if index >= self.len {
            return None;
        }
        let slot = (self.start + index) % self.width;
        let offset = slot * self.height;
        Some(&self.data[offset..offset + self.height])
    }

    /// Valid columns from oldest to newest.
    pub fn columns(&self) -> Columns<'_> {
        Columns {
            buffer: self,
            offset: 0,
            remaining: self.len,
        }
    }

    /// Reallocate to `new_width`, keeping the newest `min(len, new_width)`
    /// columns in chronological order starting at slot 0.
    pub fn resize_width(&mut self, new_width: usize) {
        assert!(
            new_width > 0,
            "CircularColumnBuffer width must be greater than zero"
        );

        let kept = self.len.min(new_width);
        let mut data = vec![0.0; new_width * self.height];
        for (target, column) in data
            .chunks_exact_mut(self.height)
            .zip(self.columns().skip(self.len - kept))
        {
            target.copy_from_slice(column);
        }

        self.data = data;
        self.width = new_width;
        self.start = 0;
        self.len = kept;
        self.written = kept as u64;
        self.epoch += 1;
    }

    /// Drop every column and reallocate zeroed storage.
    pub fn clear(&mut self) {
        self.data = vec![0.0; self.width * self.height];
        self.start = 0;
        self.len = 0;
        self.written = 0;
        self.epoch += 1;
    }
}

impl fmt::Debug for CircularColumnBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircularColumnBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("start", &self.start)
            .field("len", &self.len)
            .field("written", &self.written)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

/// Chronological iterator over the valid columns of a [`CircularColumnBuffer`].
pub struct Columns<'a> {
    buffer: &'a CircularColumnBuffer,
    offset: usize,
    remaining: usize,
}

impl<'a> Iterator for Columns<'a> {
    type Item = &'a [f32];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let column = self.buffer.column(self.offset);
        self.offset += 1;
        self.remaining -= 1;
        column
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Columns<'_> {}
