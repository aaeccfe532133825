use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::CtGovError;

const GEO_FORMAT_HINT: &str =
    "geographic filter must look like distance(<lat>,<lon>,<radius>mi|km), e.g. distance(40.7,-74,50mi)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DistanceUnit {
    Miles,
    Kilometers,
}

impl DistanceUnit {
    fn suffix(self) -> &'static str {
        match self {
            Self::Miles => "mi",
            Self::Kilometers => "km",
        }
    }
}

/// A validated `distance(lat,lon,radius)` filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GeoFilter {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
    /// `None` leaves the unit to the service default.
    pub unit: Option<DistanceUnit>,
}

impl fmt::Display for GeoFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "distance({},{},{}{})",
            self.latitude,
            self.longitude,
            self.radius,
            self.unit.map(DistanceUnit::suffix).unwrap_or_default()
        )
    }
}

fn geo_pattern() -> &'static Regex {
    static GEO_RE: OnceLock<Regex> = OnceLock::new();
    GEO_RE.get_or_init(|| {
        Regex::new(
            r"(?i)^distance\(\s*([+-]?\d+(?:\.\d+)?)\s*,\s*([+-]?\d+(?:\.\d+)?)\s*,\s*(\d+(?:\.\d+)?)\s*(mi|km)?\s*\)$",
        )
        .expect("valid geo regex")
    })
}

fn invalid(detail: impl fmt::Display) -> CtGovError {
    CtGovError::InvalidArgument(format!("{detail}; {GEO_FORMAT_HINT}"))
}

pub(crate) fn parse_geo_filter(value: &str) -> Result<GeoFilter, CtGovError> {
    let raw = value.trim();
    let Some(caps) = geo_pattern().captures(raw) else {
        return Err(invalid(format_args!("Malformed geographic filter {raw:?}")));
    };

    let number = |idx: usize| -> Result<f64, CtGovError> {
        caps.get(idx)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .parse::<f64>()
            .map_err(|_| invalid(format_args!("Malformed number in geographic filter {raw:?}")))
    };
    let latitude = number(1)?;
    let longitude = number(2)?;
    let radius = number(3)?;
    if !radius.is_finite() {
        return Err(invalid(format_args!("Radius in {raw:?} is not a finite number")));
    }

    if !(-90.0..=90.0).contains(&latitude) {
        return Err(invalid(format_args!(
            "Latitude {latitude} is outside [-90, 90]"
        )));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(invalid(format_args!(
            "Longitude {longitude} is outside [-180, 180]"
        )));
    }
    if radius <= 0.0 {
        return Err(invalid("Radius must be greater than zero"));
    }

    let unit = caps
        .get(4)
        .map(|m| m.as_str().to_ascii_lowercase())
        .map(|u| match u.as_str() {
            "km" => DistanceUnit::Kilometers,
            _ => DistanceUnit::Miles,
        });

    Ok(GeoFilter {
        latitude,
        longitude,
        radius,
        unit,
    })
}

#[cfg(test)]
mod tests {
    use super::{DistanceUnit, parse_geo_filter};

    #[test]
    fn parses_documented_example() {
        let geo = parse_geo_filter("distance(40.7,-74,50mi)").expect("valid filter");
        assert_eq!(geo.latitude, 40.7);
        assert_eq!(geo.longitude, -74.0);
        assert_eq!(geo.radius, 50.0);
        assert_eq!(geo.unit, Some(DistanceUnit::Miles));
        assert_eq!(geo.to_string(), "distance(40.7,-74,50mi)");
    }

    #[test]
    fn canonicalizes_whitespace_and_case() {
        let geo = parse_geo_filter(" Distance( 39.0035707 , -77.1013313 , 12.5 KM ) ")
            .expect("valid filter");
        assert_eq!(geo.unit, Some(DistanceUnit::Kilometers));
        assert_eq!(geo.to_string(), "distance(39.0035707,-77.1013313,12.5km)");
    }

    #[test]
    fn unit_may_be_omitted() {
        let geo = parse_geo_filter("distance(0,0,10)").expect("valid filter");
        assert_eq!(geo.unit, None);
        assert_eq!(geo.to_string(), "distance(0,0,10)");
    }

    #[test]
    fn accepts_coordinate_bounds() {
        assert!(parse_geo_filter("distance(90,180,1km)").is_ok());
        assert!(parse_geo_filter("distance(-90,-180,1km)").is_ok());
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let err = parse_geo_filter("distance(91,0,5mi)").expect_err("lat out of range");
        assert!(err.to_string().contains("Latitude"));
        let err = parse_geo_filter("distance(0,-180.5,5mi)").expect_err("lon out of range");
        assert!(err.to_string().contains("Longitude"));
    }

    #[test]
    fn rejects_malformed_shapes() {
        for bad in [
            "",
            "40.7,-74,50mi",
            "distance(40.7,-74)",
            "distance(40.7,-74,50miles)",
            "distance(40.7,-74,50ft)",
            "distance(40.7,-74,-5mi)",
            "distance(40.7,-74,0mi)",
            "distance(abc,-74,5mi)",
            "near(40.7,-74,50mi)",
        ] {
            assert!(parse_geo_filter(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn rejects_overflowing_radius() {
        let huge = "9".repeat(400);
        let err = parse_geo_filter(&format!("distance(0,0,{huge}mi)")).unwrap_err();
        assert!(err.to_string().contains("finite"));

        let err = parse_geo_filter(&format!("distance({huge},0,5km)")).unwrap_err();
        assert!(err.to_string().contains("Latitude"));
    }
}
