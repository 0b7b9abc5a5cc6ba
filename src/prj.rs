//! Projection (`.prj`) descriptor parsing.
//!
//! Reference codes come from an `AUTHORITY["EPSG",..]` tag when there is
//! one. Otherwise a fixed, ordered list of name rules guesses a code; the
//! first rule that matches wins. This is best effort and not a CRS registry.

use crate::error::FormatError;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:GEOGCS|PROJCS|GEOGCRS|PROJCRS)\["([^"]+)""#).expect("name pattern")
});
static AUTHORITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"AUTHORITY\["EPSG","(\d+)"\]"#).expect("authority pattern"));
static UTM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)UTM.*ZONE[\s_]*(\d+)([NS])?").expect("utm pattern"));

pub const WGS84: u32 = 4326;
pub const CGCS2000: u32 = 4490;
pub const WEB_MERCATOR: u32 = 3857;
pub const NAD83: u32 = 4269;
pub const NAD27: u32 = 4267;

/// Identified coordinate reference system
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceCode {
    Epsg(u32),
    /// A system outside the EPSG registry
    Other(String),
}

impl ReferenceCode {
    pub fn epsg(&self) -> Option<u32> {
        match self {
            ReferenceCode::Epsg(code) => Some(*code),
            ReferenceCode::Other(_) => None,
        }
    }
}

impl fmt::Display for ReferenceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceCode::Epsg(code) => write!(f, "EPSG:{code}"),
            ReferenceCode::Other(name) => f.write_str(name),
        }
    }
}

/// Upper-cased inputs of the name rules.
struct Probe {
    name: String,
    wkt: String,
    geographic: bool,
}

impl Probe {
    fn name_has(&self, parts: &[&str]) -> bool {
        parts.iter().all(|p| self.name.contains(p))
    }
}

type Rule = fn(&Probe) -> Option<ReferenceCode>;

const NAME_RULES: &[(&str, Rule)] = &[
    ("WGS 84", wgs84),
    ("CGCS2000", cgcs2000),
    ("Web Mercator", web_mercator),
    ("UTM", utm_zone),
    ("NAD83", nad83),
    ("NAD27", nad27),
    ("GCJ-02", gcj02),
];

fn wgs84(p: &Probe) -> Option<ReferenceCode> {
    ((p.name_has(&["WGS", "84"]) && p.geographic) || p.name == "GCS_WGS_1984")
        .then_some(ReferenceCode::Epsg(WGS84))
}

fn cgcs2000(p: &Probe) -> Option<ReferenceCode> {
    (p.name_has(&["CGCS2000"])
        || p.name_has(&["CGCS_2000"])
        || (p.name_has(&["CHINA", "2000"]) && p.geographic))
        .then_some(ReferenceCode::Epsg(CGCS2000))
}

fn web_mercator(p: &Probe) -> Option<ReferenceCode> {
    (p.name_has(&["WEB", "MERCATOR"]) || p.name_has(&["POPULAR", "VISUALISATION"]))
        .then_some(ReferenceCode::Epsg(WEB_MERCATOR))
}

fn nad83(p: &Probe) -> Option<ReferenceCode> {
    (p.name_has(&["NAD83"]) || p.name_has(&["NAD_1983"])).then_some(ReferenceCode::Epsg(NAD83))
}

fn nad27(p: &Probe) -> Option<ReferenceCode> {
    (p.name_has(&["NAD27"]) || p.name_has(&["NAD_1927"])).then_some(ReferenceCode::Epsg(NAD27))
}

// Offset-obfuscated datum used by Chinese web maps
fn gcj02(p: &Probe) -> Option<ReferenceCode> {
    p.name_has(&["GCJ"])
        .then(|| ReferenceCode::Other("GCJ-02".to_string()))
}

fn utm_zone(probe: &Probe) -> Option<ReferenceCode> {
    let caps = UTM_RE.captures(&probe.name)?;
    let zone = match caps[1].parse::<u32>() {
        Ok(zone) if (1..=60).contains(&zone) => zone,
        Ok(_) => return None,
        Err(e) => {
            warn!("invalid UTM zone {}: {e}", &caps[1]);
            return None;
        }
    };
    let north = match caps.get(2) {
        Some(h) => h.as_str().eq_ignore_ascii_case("N"),
        None => !probe.wkt.contains("SOUTH"),
    };
    let base = if north { 32600 } else { 32700 };
    Some(ReferenceCode::Epsg(base + zone))
}

/// Parsed projection descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct Projection {
    pub wkt: String,
    pub name: String,
    pub is_geographic: bool,
    pub reference: Option<ReferenceCode>,
    /// The code was taken from an authority tag rather than guessed
    pub from_authority: bool,
    /// Coordinates must be transformed before use as WGS 84
    pub needs_transform: bool,
}

impl Projection {
    /// Decodes UTF-8 `.prj` bytes.
    pub fn read(bytes: &[u8]) -> Result<Projection, FormatError> {
        Ok(Projection::parse(std::str::from_utf8(bytes)?))
    }

    /// Parses WKT text. Lines are trimmed and joined with single spaces.
    pub fn parse(text: &str) -> Projection {
        let wkt = text.lines().map(str::trim).collect::<Vec<_>>().join(" ");
        let wkt = wkt.trim().to_string();
        if wkt.is_empty() {
            return Projection {
                wkt,
                name: "Unknown".to_string(),
                is_geographic: true,
                reference: None,
                from_authority: false,
                needs_transform: false,
            };
        }

        let is_geographic = wkt.starts_with("GEOGCS[") || wkt.starts_with("GEOGCRS[");
        let name = NAME_RE
            .captures(&wkt)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        let authority = AUTHORITY_RE
            .captures(&wkt)
            .and_then(|c| c[1].parse::<u32>().ok())
            .map(ReferenceCode::Epsg);
        let from_authority = authority.is_some();
        let reference = authority.or_else(|| {
            let probe = Probe {
                name: name.to_uppercase(),
                wkt: wkt.to_uppercase(),
                geographic: is_geographic,
            };
            NAME_RULES.iter().find_map(|(label, rule)| {
                let code = rule(&probe)?;
                debug!("projection {name:?} matched the {label} rule");
                Some(code)
            })
        });

        let needs_transform = match &reference {
            Some(ReferenceCode::Epsg(WGS84)) => false,
            _ if !is_geographic => true,
            Some(_) => true,
            None => {
                warn!("unknown projection {name:?}, assuming WGS 84 compatible");
                false
            }
        };

        let projection = Projection {
            wkt,
            name,
            is_geographic,
            reference,
            from_authority,
            needs_transform,
        };
        debug!(
            "projection {}, needs transform: {}",
            projection.description(),
            projection.needs_transform
        );
        projection
    }

    pub fn epsg(&self) -> Option<u32> {
        self.reference.as_ref().and_then(ReferenceCode::epsg)
    }

    /// Registry WKT of the resolved EPSG code.
    pub fn definition(&self) -> Option<&'static str> {
        let code = u16::try_from(self.epsg()?).ok()?;
        crs_definitions::from_code(code).map(|def| def.wkt)
    }

    /// `"<name> (<code>) - Geographic|Projected"`, code omitted when unknown.
    pub fn description(&self) -> String {
        let kind = if self.is_geographic {
            "Geographic"
        } else {
            "Projected"
        };
        match &self.reference {
            Some(code) => format!("{} ({code}) - {kind}", self.name),
            None => format!("{} - {kind}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WGS84_WKT: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

    #[test]
    fn esri_wgs84() {
        let prj = Projection::parse(WGS84_WKT);
        assert!(prj.is_geographic);
        assert_eq!(prj.name, "GCS_WGS_1984");
        assert_eq!(prj.reference, Some(ReferenceCode::Epsg(4326)));
        assert!(!prj.from_authority);
        assert!(!prj.needs_transform);
        assert_eq!(prj.description(), "GCS_WGS_1984 (EPSG:4326) - Geographic");
        assert!(prj.definition().is_some());
    }

    #[test]
    fn authority_tag_wins() {
        let prj = Projection::parse(
            "PROJCS[\"WGS 84 / Pseudo-Mercator\",\n  GEOGCS[\"WGS 84\"],\n  AUTHORITY[\"EPSG\",\"3857\"]]",
        );
        assert!(!prj.is_geographic);
        assert!(prj.from_authority);
        assert_eq!(prj.epsg(), Some(3857));
        assert!(prj.needs_transform);
        assert!(prj.wkt.contains("Pseudo-Mercator\", GEOGCS"));
    }

    #[test]
    fn utm_zones() {
        let north = Projection::parse(r#"PROJCS["WGS_1984_UTM_Zone_50N",GEOGCS["GCS_WGS_1984"]]"#);
        assert_eq!(north.epsg(), Some(32650));
        assert!(north.needs_transform);

        let south = Projection::parse(r#"PROJCS["WGS 84 / UTM zone 33S",GEOGCS["WGS 84"]]"#);
        assert_eq!(south.epsg(), Some(32733));

        let from_wkt = Projection::parse(
            r#"PROJCS["UTM Zone 18",GEOGCS["WGS 84"],PARAMETER["false_northing",10000000],PROJECTION["Transverse_Mercator"],AXIS["Southing",SOUTH]]"#,
        );
        assert_eq!(from_wkt.epsg(), Some(32718));

        let invalid = Projection::parse(r#"PROJCS["UTM Zone 61N"]"#);
        assert_eq!(invalid.reference, None);
    }

    #[test]
    fn name_rules_in_order() {
        let cases = [
            (r#"GEOGCS["China Geodetic Coordinate System 2000"]"#, 4490),
            (r#"PROJCS["CGCS2000_3_Degree_GK_CM_117E"]"#, 4490),
            (r#"PROJCS["WGS_1984_Web_Mercator_Auxiliary_Sphere"]"#, 3857),
            (r#"PROJCS["NAD_1983_StatePlane_California_III"]"#, 4269),
            (r#"GEOGCS["NAD27"]"#, 4267),
        ];
        for (wkt, code) in cases {
            assert_eq!(Projection::parse(wkt).epsg(), Some(code), "{wkt}");
        }
    }

    #[test]
    fn gcj02_is_not_epsg() {
        let prj = Projection::parse(r#"GEOGCS["GCJ02"]"#);
        assert_eq!(prj.reference, Some(ReferenceCode::Other("GCJ-02".into())));
        assert!(prj.needs_transform);
        assert!(prj.definition().is_none());
    }

    #[test]
    fn unknown_systems() {
        let geographic = Projection::parse(r#"GEOGCS["Mars 2000"]"#);
        assert_eq!(geographic.reference, None);
        assert!(!geographic.needs_transform);
        assert_eq!(geographic.description(), "Mars 2000 - Geographic");

        let projected = Projection::parse(r#"PROJCS["Local grid"]"#);
        assert!(projected.needs_transform);

        let empty = Projection::parse("  \n ");
        assert_eq!(empty.name, "Unknown");
        assert!(empty.is_geographic);
        assert!(!empty.needs_transform);
    }
}
