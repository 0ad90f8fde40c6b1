//! Bounds the number of provider create calls in flight

use std::sync::{Mutex, PoisonError};

use tracing::debug;

/// Limits concurrent VM creates independently of reconciler concurrency
///
/// The counter lock is held only while checking and updating the count, never across a
/// provider call. Callers that get no permit must not wait for one.
#[derive(Debug)]
pub struct CreateAdmission {
    in_flight: Mutex<usize>,
    bound: usize,
}

/// Slot held for the duration of one provider create; released on drop
#[derive(Debug)]
pub struct CreatePermit<'a> {
    admission: &'a CreateAdmission,
}

impl CreateAdmission {
    pub fn new(bound: usize) -> Self {
        Self {
            in_flight: Mutex::new(0),
            bound,
        }
    }

    /// Bound of `ceil(total * percent / 100)`
    pub fn from_concurrency(total: usize, percent: u32) -> Self {
        let bound = (total * percent as usize + 99) / 100;
        Self::new(bound)
    }

    pub fn bound(&self) -> usize {
        self.bound
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a slot if one is free
    pub fn try_acquire(&self) -> Option<CreatePermit<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if *in_flight >= self.bound {
            debug!(in_flight = *in_flight, bound = self.bound, "No create slot available");
            return None;
        }
        *in_flight += 1;
        Some(CreatePermit { admission: self })
    }

    fn release(&self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        *in_flight = in_flight.saturating_sub(1);
    }
}

impl Drop for CreatePermit<'_> {
    fn drop(&mut self) {
        self.admission.release();
    }
}
