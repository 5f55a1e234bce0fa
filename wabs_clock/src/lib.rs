//! Utilities for telling time in token lifecycles
//!
//! Token expirations are tracked as milliseconds since the Unix epoch. All
//! arithmetic saturates at [`UnixTime::MAX`], so an authority handing out an
//! absurd lifetime can never overflow an expiration timestamp.
//!
//! Clocks are abstracted behind the [`Clock`] trait so that tests can pin
//! the current time with a [`TestClock`].

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_must_use
)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

use std::{
    ops,
    time::{Duration, SystemTime},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const MILLIS_PER_SEC: u64 = 1000;

/// Unix time
///
/// Unix time as represented by the number of milliseconds elapsed since the
/// beginning of the Unix epoch on 1970/01/01 at 00:00:00 UTC.
///
/// Values never exceed [`UnixTime::MAX`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct UnixTime(u64);

impl UnixTime {
    /// The Unix epoch
    pub const EPOCH: Self = Self(0);

    /// The latest representable instant, 100,000,000 days after the epoch
    pub const MAX: Self = Self(8_640_000_000_000_000);

    /// Constructs a time from milliseconds since the epoch, clamped to [`UnixTime::MAX`]
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        if millis > Self::MAX.0 {
            Self::MAX
        } else {
            Self(millis)
        }
    }

    /// Constructs a time from whole seconds since the epoch, clamped to [`UnixTime::MAX`]
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Self::from_millis(secs.saturating_mul(MILLIS_PER_SEC))
    }

    /// Milliseconds since the epoch
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Whole seconds since the epoch
    #[inline]
    pub const fn as_secs(self) -> u64 {
        self.0 / MILLIS_PER_SEC
    }

    /// Adds a duration, clamping the result to [`UnixTime::MAX`]
    #[inline]
    pub const fn saturating_add(self, duration: DurationSecs) -> Self {
        Self::from_millis(self.0.saturating_add(duration.as_millis()))
    }

    /// The time elapsed since `earlier`, or zero if `earlier` is later than `self`
    #[inline]
    pub fn saturating_duration_since(self, earlier: UnixTime) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    /// Converts to a [`SystemTime`]
    #[inline]
    pub fn to_system_time(self) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_millis(self.0)
    }
}

impl From<SystemTime> for UnixTime {
    /// Times before the epoch are treated as the epoch
    #[inline]
    fn from(t: SystemTime) -> Self {
        let millis = t
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();

        Self::from_millis(millis)
    }
}

impl From<UnixTime> for SystemTime {
    #[inline]
    fn from(t: UnixTime) -> Self {
        t.to_system_time()
    }
}

impl ops::Add<DurationSecs> for UnixTime {
    type Output = UnixTime;

    #[inline]
    fn add(self, rhs: DurationSecs) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl ops::Sub for UnixTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: UnixTime) -> Self::Output {
        self.saturating_duration_since(rhs)
    }
}

#[cfg(feature = "serde")]
#[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
impl Serialize for UnixTime {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

#[cfg(feature = "serde")]
#[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
impl<'de> Deserialize<'de> for UnixTime {
    #[inline]
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Self::from_millis(ms))
    }
}

/// A duration measured in whole seconds
///
/// Authorities report token lifetimes (`expires_in`) and cache lifetimes
/// (`max-age`) in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[repr(transparent)]
pub struct DurationSecs(pub u64);

impl DurationSecs {
    /// The duration in milliseconds, saturating at `u64::MAX`
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0.saturating_mul(MILLIS_PER_SEC)
    }
}

impl From<DurationSecs> for Duration {
    #[inline]
    fn from(d: DurationSecs) -> Self {
        Duration::from_secs(d.0)
    }
}

impl From<Duration> for DurationSecs {
    #[inline]
    fn from(d: Duration) -> Self {
        DurationSecs(d.as_secs())
    }
}

/// Represents a clock, which can tell the current time
pub trait Clock {
    /// Gets the current time according to this clock
    fn now(&self) -> UnixTime;
}

impl<C: Clock + ?Sized> Clock for &C {
    #[inline]
    fn now(&self) -> UnixTime {
        (**self).now()
    }
}

/// The system clock as provided by `std::time::SystemTime`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct System;

impl Clock for System {
    #[inline]
    fn now(&self) -> UnixTime {
        UnixTime::from(SystemTime::now())
    }
}

/// A test clock which maintains the current time as internal state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TestClock(UnixTime);

impl Clock for TestClock {
    #[inline]
    fn now(&self) -> UnixTime {
        self.0
    }
}

impl TestClock {
    /// Creates a new test clock with the specified time
    #[inline]
    pub const fn new(time: UnixTime) -> Self {
        Self(time)
    }

    /// Updates the clock's current time to `val`
    pub fn set(&mut self, val: UnixTime) {
        self.0 = val;
    }

    /// Increments the clock's current time by `inc` seconds
    pub fn inc(&mut self, inc: u64) {
        self.0 = self.0 + DurationSecs(inc);
    }

    /// Increments the clock's current time by `inc` milliseconds
    pub fn inc_millis(&mut self, inc: u64) {
        self.0 = UnixTime::from_millis(self.0.as_millis().saturating_add(inc));
    }
}
