/// A single satisfiable byte range, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// Outcome of interpreting a `Range` header against a file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable range: serve the whole body.
    Full,
    Partial(ByteRange),
    /// Syntactically valid but outside the file.
    Unsatisfiable,
}

impl ByteRange {
    /// The range covering a whole file, `None` for an empty file.
    pub fn full(size: u64) -> Option<Self> {
        (size > 0).then(|| Self {
            start: 0,
            end: size - 1,
        })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }

    /// Interpret a `Range` header value.
    ///
    /// Only single `bytes=` ranges are honoured. Malformed values and
    /// multi-range requests fall back to the full body.
    pub fn parse(header: &str, size: u64) -> RangeRequest {
        let Some(spec) = header.trim().strip_prefix("bytes=") else {
            return RangeRequest::Full;
        };
        if spec.contains(',') {
            return RangeRequest::Full;
        }
        let Some((first, last)) = spec.trim().split_once('-') else {
            return RangeRequest::Full;
        };
        let (first, last) = (first.trim(), last.trim());

        if first.is_empty() {
            // Suffix range: the final `n` bytes.
            let Ok(suffix) = last.parse::<u64>() else {
                return RangeRequest::Full;
            };
            if suffix == 0 || size == 0 {
                return RangeRequest::Unsatisfiable;
            }
            return RangeRequest::Partial(Self {
                start: size.saturating_sub(suffix),
                end: size - 1,
            });
        }

        let Ok(start) = first.parse::<u64>() else {
            return RangeRequest::Full;
        };
        let end = if last.is_empty() {
            None
        } else {
            match last.parse::<u64>() {
                Ok(end) if end >= start => Some(end),
                _ => return RangeRequest::Full,
            }
        };

        if start >= size {
            return RangeRequest::Unsatisfiable;
        }
        let end = end.map_or(size - 1, |end| end.min(size - 1));
        RangeRequest::Partial(Self { start, end })
    }
}
