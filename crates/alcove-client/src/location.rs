//! Device position lookup.

use alcove_core::external::{ExternalError, Geolocator, Position};
use async_trait::async_trait;

/// Geolocator that reports one fixed position.
///
/// Stands in for platform location services in tests and the
/// simulator; embedding applications wrap their platform API behind
/// [`Geolocator`] instead. Built with [`denied`](Self::denied), it
/// models a device whose location permission was refused.
pub struct FixedGeolocator {
    position: Option<Position>,
}

impl FixedGeolocator {
    /// A geolocator pinned to `position`.
    pub fn new(position: Position) -> Self {
        Self { position: Some(position) }
    }

    /// A geolocator whose lookups always fail, as on a device that
    /// refused the location permission.
    pub fn denied() -> Self {
        Self { position: None }
    }
}

#[async_trait]
impl Geolocator for FixedGeolocator {
    async fn current_position(&self) -> Result<Position, ExternalError> {
        self.position
            .ok_or_else(|| ExternalError::Unavailable("location permission denied".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_the_pinned_position() {
        let position = Position { latitude: 59.33, longitude: 18.06 };
        let located = FixedGeolocator::new(position);

        assert_eq!(located.current_position().await.unwrap(), position);
    }

    #[tokio::test]
    async fn denied_lookup_is_unavailable() {
        let err = FixedGeolocator::denied().current_position().await.unwrap_err();
        assert!(matches!(err, ExternalError::Unavailable(_)));
    }
}
