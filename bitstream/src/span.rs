/// A strided run of indices that can be walked in either direction.
///
/// The bank mapper describes every tile as a row span and a column span and
/// flips them for the top and right quadrants, so both flips are exact
/// involutions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub len: usize,
    pub step: usize,
    pub descending: bool,
}

impl Span {
    pub fn new(start: usize, len: usize) -> Self {
        Self::with_step(start, len, 1)
    }

    pub fn with_step(start: usize, len: usize, step: usize) -> Self {
        assert!(step != 0);
        Self {
            start,
            len,
            step,
            descending: false,
        }
    }

    /// Largest index covered; only meaningful for non-empty spans.
    fn last(&self) -> usize {
        self.start + (self.len - 1) * self.step
    }

    pub fn get(&self, i: usize) -> usize {
        assert!(i < self.len, "span index {i} out of range {len}", len = self.len);
        if self.descending {
            self.start + (self.len - 1 - i) * self.step
        } else {
            self.start + i * self.step
        }
    }

    /// The same indices walked the other way.
    pub fn rev(self) -> Self {
        Self {
            descending: !self.descending,
            ..self
        }
    }

    /// Reflects every index `k` to `total - 1 - k`.
    pub fn mirror(self, total: usize) -> Self {
        if self.len == 0 {
            return self;
        }
        assert!(self.last() < total);
        Self {
            start: total - 1 - self.last(),
            descending: !self.descending,
            ..self
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = usize> + ExactSizeIterator + '_ {
        (0..self.len).map(|i| self.get(i))
    }
}

#[cfg(test)]
fn spans(total: usize) -> Vec<Span> {
    let mut res = vec![];
    for step in 1..4 {
        for start in 0..total {
            for len in 0..=total {
                let span = Span::with_step(start, len, step);
                if len == 0 || span.last() < total {
                    res.push(span);
                    res.push(span.rev());
                }
            }
        }
    }
    res
}

#[test]
fn test_rev() {
    let seq: Vec<usize> = (100..110).collect();
    for span in spans(seq.len()) {
        assert_eq!(span.rev().rev(), span);
        let fwd: Vec<_> = span.iter().map(|i| seq[i]).collect();
        let mut bwd: Vec<_> = span.rev().iter().map(|i| seq[i]).collect();
        bwd.reverse();
        assert_eq!(fwd, bwd);
    }
}

#[test]
fn test_mirror() {
    let total = 10;
    for span in spans(total) {
        let mirrored = span.mirror(total);
        assert_eq!(mirrored.mirror(total), span);
        let exp: Vec<_> = span.iter().map(|k| total - 1 - k).collect();
        let got: Vec<_> = mirrored.iter().collect();
        assert_eq!(got, exp);
    }
}

#[test]
fn test_get() {
    let span = Span::new(16, 4);
    assert_eq!(span.iter().collect::<Vec<_>>(), [16, 17, 18, 19]);
    assert_eq!(span.rev().iter().collect::<Vec<_>>(), [19, 18, 17, 16]);
    assert_eq!(span.mirror(32).iter().collect::<Vec<_>>(), [15, 14, 13, 12]);
}
