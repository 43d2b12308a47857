//! Dataset header JSON, as produced by the server for each loaded cube.
//!
//! Field names follow the FITS keywords (`CRVAL3`, `RESTFRQ`, ...) for the
//! calibration block and lower case for the computed statistics. Missing
//! fields fall back to zero or empty strings.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use cubeview_core::{
    Calibration, Dataset, FluxCurve, PixelHistogram, PixelStats,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Header and statistics of one dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetHeader {
    /// Dataset identifier (not part of the FITS header proper).
    pub dataset_id: String,
    /// Raw FITS header cards.
    #[serde(rename = "HEADER")]
    pub header: String,

    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub polarisation: u32,
    pub filesize: u64,

    #[serde(rename = "IGNRVAL")]
    pub ignrval: f64,
    #[serde(rename = "CRVAL1")]
    pub crval1: f64,
    #[serde(rename = "CRVAL2")]
    pub crval2: f64,
    #[serde(rename = "CRVAL3")]
    pub crval3: f64,
    #[serde(rename = "CDELT1")]
    pub cdelt1: f64,
    #[serde(rename = "CDELT2")]
    pub cdelt2: f64,
    #[serde(rename = "CDELT3")]
    pub cdelt3: f64,
    #[serde(rename = "CRPIX1")]
    pub crpix1: f64,
    #[serde(rename = "CRPIX2")]
    pub crpix2: f64,
    #[serde(rename = "CRPIX3")]
    pub crpix3: f64,
    #[serde(rename = "CUNIT1")]
    pub cunit1: String,
    #[serde(rename = "CUNIT2")]
    pub cunit2: String,
    #[serde(rename = "CUNIT3")]
    pub cunit3: String,
    #[serde(rename = "CTYPE1")]
    pub ctype1: String,
    #[serde(rename = "CTYPE2")]
    pub ctype2: String,
    #[serde(rename = "CTYPE3")]
    pub ctype3: String,
    #[serde(rename = "BMAJ")]
    pub bmaj: f64,
    #[serde(rename = "BMIN")]
    pub bmin: f64,
    #[serde(rename = "BPA")]
    pub bpa: f64,
    #[serde(rename = "BUNIT")]
    pub bunit: String,
    #[serde(rename = "BTYPE")]
    pub btype: String,
    #[serde(rename = "SPECSYS")]
    pub specsys: String,
    #[serde(rename = "RESTFRQ")]
    pub restfrq: f64,
    #[serde(rename = "OBSRA")]
    pub obsra: f64,
    #[serde(rename = "OBSDEC")]
    pub obsdec: f64,
    #[serde(rename = "OBJECT")]
    pub object: String,
    #[serde(rename = "DATEOBS")]
    pub dateobs: String,
    #[serde(rename = "TIMESYS")]
    pub timesys: String,
    #[serde(rename = "LINE")]
    pub line: String,

    pub mean_spectrum: Vec<f32>,
    pub integrated_spectrum: Vec<f32>,

    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub sensitivity: f64,
    pub ratio_sensitivity: f64,
    pub black: f64,
    pub white: f64,
    /// Flux curve name chosen by the server.
    pub flux: String,
    pub histogram: Vec<i32>,
    /// Histogram range; defaults to `[min, max]` when absent.
    pub pmin: Option<f64>,
    pub pmax: Option<f64>,
}

impl DatasetHeader {
    /// Parse a header from a JSON string.
    ///
    /// # Errors
    /// Returns [`Error::Json`] for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a header from a JSON file.
    ///
    /// # Errors
    /// Returns [`Error::Io`] or [`Error::Json`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Flux curve named in the header, logistic when empty or unknown.
    #[must_use]
    pub fn flux_curve(&self) -> FluxCurve {
        if self.flux.is_empty() {
            return FluxCurve::default();
        }
        self.flux.parse().unwrap_or_else(|_| {
            log::warn!("unknown flux curve {:?} in header, using logistic", self.flux);
            FluxCurve::default()
        })
    }

    #[must_use]
    pub fn calibration(&self) -> Calibration {
        Calibration {
            crval: [self.crval1, self.crval2, self.crval3],
            cdelt: [self.cdelt1, self.cdelt2, self.cdelt3],
            crpix: [self.crpix1, self.crpix2, self.crpix3],
            cunit: [self.cunit1.clone(), self.cunit2.clone(), self.cunit3.clone()],
            ctype: [self.ctype1.clone(), self.ctype2.clone(), self.ctype3.clone()],
            restfrq: self.restfrq,
            bmaj: self.bmaj,
            bmin: self.bmin,
            bpa: self.bpa,
            bunit: self.bunit.clone(),
            btype: self.btype.clone(),
            specsys: self.specsys.clone(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> PixelStats {
        PixelStats {
            min: self.min,
            max: self.max,
            median: self.median,
            black: self.black,
            white: self.white,
            sensitivity: self.sensitivity,
            ratio_sensitivity: self.ratio_sensitivity,
        }
    }

    #[must_use]
    pub fn histogram(&self) -> PixelHistogram {
        PixelHistogram::from_bins(
            &self.histogram,
            self.pmin.unwrap_or(self.min),
            self.pmax.unwrap_or(self.max),
        )
    }

    /// Build the client-side dataset model.
    ///
    /// Statistics may still be all zero (server not ready); that is
    /// reported through [`Dataset::is_calibrated`], not as an error.
    ///
    /// # Errors
    /// Returns [`Error::InvalidHeader`] for zero image dimensions.
    pub fn to_dataset(&self) -> Result<Dataset> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidHeader(format!(
                "{}: image dimensions {}x{}",
                self.dataset_id, self.width, self.height
            )));
        }
        let mut dataset = Dataset::new(
            self.dataset_id.clone(),
            self.width as usize,
            self.height as usize,
            self.depth.max(1) as usize,
        )
        .with_calibration(self.calibration())
        .with_stats(self.stats())
        .with_curve(self.flux_curve());
        dataset.polarisation = self.polarisation.max(1) as usize;
        dataset.histogram = self.histogram();
        dataset.mean_spectrum.clone_from(&self.mean_spectrum);
        dataset.integrated_spectrum.clone_from(&self.integrated_spectrum);
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLE: &str = r#"{
        "dataset_id": "ALMA01",
        "width": 800, "height": 600, "depth": 11, "polarisation": 1,
        "CRVAL3": 100.0, "CDELT3": 0.5, "CRPIX3": 1.0,
        "CUNIT3": "GHz", "CTYPE3": "FREQ", "RESTFRQ": 1.0e11,
        "BUNIT": "Jy/beam",
        "min": -1.0, "max": 250.0, "median": 80.0,
        "black": 10.0, "white": 200.0, "sensitivity": 0.005,
        "flux": "logistic",
        "histogram": [1, 2, 3, 4],
        "mean_spectrum": [0.5, 0.6]
    }"#;

    #[test]
    fn test_parse_header() {
        let header = DatasetHeader::from_json(SAMPLE).unwrap();
        assert_eq!(header.width, 800);
        assert_eq!(header.cunit3, "GHz");
        assert_eq!(header.flux_curve(), FluxCurve::Logistic);
        let ds = header.to_dataset().unwrap();
        assert!(ds.is_calibrated());
        assert_eq!(ds.histogram.len(), 4);
        assert_relative_eq!(ds.histogram.pmax(), 250.0);
        let (lo, hi) = ds.frequency_range().unwrap();
        assert_relative_eq!(lo, 100e9);
        assert_relative_eq!(hi, 105e9);
    }

    #[test]
    fn test_unknown_flux_falls_back() {
        let header = DatasetHeader {
            flux: "banana".into(),
            ..DatasetHeader::default()
        };
        assert_eq!(header.flux_curve(), FluxCurve::Logistic);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let header = DatasetHeader::default();
        assert!(matches!(header.to_dataset(), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("header.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let header = DatasetHeader::from_file(&path).unwrap();
        assert_eq!(header.depth, 11);
    }
}
