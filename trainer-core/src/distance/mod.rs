//! Pull-distance readings.

/// Source of the current cord pull distance, in centimeters.
pub trait DistanceSource {
    /// Returns the latest reading.
    fn read(&mut self) -> f32;

    /// Re-zeroes the source after the cord has been wound back.
    fn reset(&mut self) {}
}

/// Adapter that never reports a shorter distance than it already has.
///
/// Encoder jitter while the trainee hesitates would otherwise move the
/// reading backwards by a count or two. The high-water mark is cleared only
/// by [`DistanceSource::reset`].
#[derive(Debug)]
pub struct MonotonicDistance<D> {
    inner: D,
    high_water: Option<f32>,
}

impl<D> MonotonicDistance<D>
where
    D: DistanceSource,
{
    pub const fn new(inner: D) -> Self {
        Self {
            inner,
            high_water: None,
        }
    }

    pub const fn inner(&self) -> &D {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut D {
        &mut self.inner
    }
}

impl<D> DistanceSource for MonotonicDistance<D>
where
    D: DistanceSource,
{
    fn read(&mut self) -> f32 {
        let raw = self.inner.read();
        let reading = match self.high_water {
            Some(mark) if mark > raw => mark,
            _ => raw,
        };
        self.high_water = Some(reading);
        reading
    }

    fn reset(&mut self) {
        self.high_water = None;
        self.inner.reset();
    }
}
