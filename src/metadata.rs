//! Metadata store populated as a side effect of opening a file.
//!
//! The bridge keeps one snapshot of per-series physical pixel sizes, taken
//! from the adapter when a file is opened. The snapshot outlives the open
//! file: physical-size queries and the metadata dump keep answering after
//! `close`, until the next `open` replaces the snapshot.
//!
//! The full document is serialized as OME-styled XML; only the physical
//! pixel sizes are modeled, the rest of the OME object model stays with the
//! engine.

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::adapter::{FormatAdapter, PhysicalSizes};
use crate::error::BridgeError;

/// Unit attribute written for every physical size: micrometers.
const SIZE_UNIT: &str = "µm";

/// Per-series physical pixel sizes plus the serializable document form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataStore {
    series: Vec<PhysicalSizes>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot physical sizes for every series of a freshly opened adapter.
    pub fn from_adapter(adapter: &dyn FormatAdapter) -> Result<Self, BridgeError> {
        let count = adapter.series_count();
        let mut series = Vec::with_capacity(count);
        for index in 0..count {
            series.push(adapter.physical_sizes(index)?);
        }
        Ok(Self { series })
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Physical sizes for a series; `None` when the index is out of range.
    pub fn physical_sizes(&self, series: usize) -> Option<&PhysicalSizes> {
        self.series.get(series)
    }

    /// Serialize the store as an OME-styled XML document.
    ///
    /// Unspecified sizes are omitted rather than written as zero, so a
    /// re-parse distinguishes "not specified" from "specified as 0".
    pub fn dump_xml(&self) -> Result<String, BridgeError> {
        let mut writer = Writer::new(Vec::new());
        let xml_err = |e: quick_xml::Error| BridgeError::Metadata(e.to_string());

        writer
            .write_event(Event::Start(BytesStart::new("OME")))
            .map_err(xml_err)?;
        for (index, sizes) in self.series.iter().enumerate() {
            let mut image = BytesStart::new("Image");
            image.push_attribute(("ID", format!("Image:{index}").as_str()));
            writer.write_event(Event::Start(image)).map_err(xml_err)?;

            let mut pixels = BytesStart::new("Pixels");
            pixels.push_attribute(("ID", format!("Pixels:{index}").as_str()));
            for (axis, value) in [("X", sizes.x), ("Y", sizes.y), ("Z", sizes.z)] {
                if let Some(v) = value {
                    pixels.push_attribute((
                        format!("PhysicalSize{axis}").as_str(),
                        v.to_string().as_str(),
                    ));
                    pixels.push_attribute((format!("PhysicalSize{axis}Unit").as_str(), SIZE_UNIT));
                }
            }
            writer.write_event(Event::Empty(pixels)).map_err(xml_err)?;

            writer
                .write_event(Event::End(BytesStart::new("Image").to_end()))
                .map_err(xml_err)?;
        }
        writer
            .write_event(Event::End(BytesStart::new("OME").to_end()))
            .map_err(xml_err)?;

        String::from_utf8(writer.into_inner()).map_err(|e| BridgeError::Metadata(e.to_string()))
    }

    /// Re-parse a document produced by [`MetadataStore::dump_xml`].
    pub fn parse_xml(xml: &str) -> Result<Self, BridgeError> {
        let mut reader = Reader::from_str(xml);
        let mut series = Vec::new();

        loop {
            match reader
                .read_event()
                .map_err(|e| BridgeError::Metadata(e.to_string()))?
            {
                Event::Empty(e) | Event::Start(e) if e.name().as_ref() == b"Pixels" => {
                    let mut sizes = PhysicalSizes::default();
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| BridgeError::Metadata(e.to_string()))?;
                        let value = attr
                            .unescape_value()
                            .map_err(|e| BridgeError::Metadata(e.to_string()))?;
                        let parsed = value.parse::<f64>().ok();
                        match attr.key.as_ref() {
                            b"PhysicalSizeX" => sizes.x = parsed,
                            b"PhysicalSizeY" => sizes.y = parsed,
                            b"PhysicalSizeZ" => sizes.z = parsed,
                            _ => {}
                        }
                    }
                    series.push(sizes);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(Self { series })
    }
}

// =============================================================================
// Tests
// =============================================================================
