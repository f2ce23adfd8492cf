// This is free and unencumbered software released into the public domain.

use crate::shared::{CameraError, CameraResult};
use derive_more::Display;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Facing {
    #[display("front")]
    Front,
    #[display("back")]
    Back,
    #[display("external")]
    External,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("{width}x{height}")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    #[inline]
    pub fn max_edge(&self) -> u32 {
        self.width.max(self.height)
    }

    #[inline]
    pub fn fits_within(&self, bound: Resolution) -> bool {
        self.width <= bound.width && self.height <= bound.height
    }
}

impl FromStr for Resolution {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().replace('×', "x");
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| CameraError::invalid_argument(format!("resolution `{s}` is not WxH")))?;
        let width = w
            .trim()
            .parse()
            .map_err(|_| CameraError::invalid_argument(format!("invalid width `{w}`")))?;
        let height = h
            .trim()
            .parse()
            .map_err(|_| CameraError::invalid_argument(format!("invalid height `{h}`")))?;
        if width == 0 || height == 0 {
            return Err(CameraError::invalid_argument(format!(
                "resolution `{s}` has a zero edge"
            )));
        }
        Ok(Self { width, height })
    }
}

/// A named quality tier, mapped to a concrete size per device.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum ResolutionPreset {
    #[display("low")]
    Low,
    #[display("medium")]
    Medium,
    #[display("high")]
    High,
    #[display("veryHigh")]
    VeryHigh,
    #[display("ultraHigh")]
    UltraHigh,
    #[display("max")]
    Max,
}

impl ResolutionPreset {
    /// The bounding box for this tier, or `None` for [`ResolutionPreset::Max`].
    pub fn target(self) -> Option<Resolution> {
        match self {
            ResolutionPreset::Low => Some(Resolution::new(320, 240)),
            ResolutionPreset::Medium => Some(Resolution::new(720, 480)),
            ResolutionPreset::High => Some(Resolution::new(1280, 720)),
            ResolutionPreset::VeryHigh => Some(Resolution::new(1920, 1080)),
            ResolutionPreset::UltraHigh => Some(Resolution::new(3840, 2160)),
            ResolutionPreset::Max => None,
        }
    }
}

impl FromStr for ResolutionPreset {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "low" => ResolutionPreset::Low,
            "medium" => ResolutionPreset::Medium,
            "high" => ResolutionPreset::High,
            "veryHigh" => ResolutionPreset::VeryHigh,
            "ultraHigh" => ResolutionPreset::UltraHigh,
            "max" => ResolutionPreset::Max,
            other => {
                return Err(CameraError::invalid_argument(format!(
                    "unknown resolution preset `{other}`"
                )));
            },
        })
    }
}

/// A physical camera as enumerated by the driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub id: String,
    pub facing: Facing,
    pub sensor_orientation: u32,
    pub supported_resolutions: Vec<Resolution>,
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, facing: Facing) -> Self {
        Self {
            id: id.into(),
            facing,
            sensor_orientation: 0,
            supported_resolutions: Vec::new(),
        }
    }

    pub fn with_sensor_orientation(mut self, degrees: u32) -> Self {
        self.sensor_orientation = degrees % 360;
        self
    }

    pub fn with_resolutions(mut self, resolutions: impl IntoIterator<Item = Resolution>) -> Self {
        self.supported_resolutions.extend(resolutions);
        self
    }

    /// Picks the preview size for `preset` from the supported set.
    ///
    /// Takes the largest size fitting inside the preset's bounding box, falling
    /// back to the smallest supported size when nothing fits.
    pub fn negotiate(&self, preset: ResolutionPreset) -> CameraResult<Resolution> {
        let by_area = |r: &&Resolution| (r.pixels(), r.width);
        let smallest = self.supported_resolutions.iter().min_by_key(by_area);
        let chosen = match preset.target() {
            None => self.supported_resolutions.iter().max_by_key(by_area),
            Some(bound) => self
                .supported_resolutions
                .iter()
                .filter(|r| r.fits_within(bound))
                .max_by_key(by_area)
                .or(smallest),
        };
        chosen.copied().ok_or_else(|| {
            CameraError::invalid_argument(format!(
                "camera `{}` reports no supported resolutions",
                self.id
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceDescriptor {
        DeviceDescriptor::new("0", Facing::Back).with_resolutions([
            Resolution::new(640, 480),
            Resolution::new(1280, 720),
            Resolution::new(1920, 1080),
            Resolution::new(4000, 3000),
        ])
    }

    #[test]
    fn negotiates_largest_fitting_size() {
        let d = device();
        assert_eq!(d.negotiate(ResolutionPreset::High).unwrap(), Resolution::new(1280, 720));
        assert_eq!(d.negotiate(ResolutionPreset::Medium).unwrap(), Resolution::new(640, 480));
        assert_eq!(d.negotiate(ResolutionPreset::Max).unwrap(), Resolution::new(4000, 3000));
    }

    #[test]
    fn falls_back_to_smallest_when_nothing_fits() {
        let d = device();
        assert_eq!(d.negotiate(ResolutionPreset::Low).unwrap(), Resolution::new(640, 480));
    }

    #[test]
    fn rejects_device_without_resolutions() {
        let d = DeviceDescriptor::new("9", Facing::Front);
        assert!(matches!(
            d.negotiate(ResolutionPreset::High),
            Err(CameraError::InvalidArgument(_))
        ));
    }

    #[test]
    fn parses_presets_and_sizes() {
        assert_eq!("veryHigh".parse::<ResolutionPreset>().unwrap(), ResolutionPreset::VeryHigh);
        assert!("huge".parse::<ResolutionPreset>().is_err());
        assert_eq!("1920x1080".parse::<Resolution>().unwrap(), Resolution::new(1920, 1080));
        assert_eq!("640×480".parse::<Resolution>().unwrap().to_string(), "640x480");
        assert!("0x480".parse::<Resolution>().is_err());
    }
}
