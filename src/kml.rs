use std::{
    collections::BTreeMap,
    fmt::{self, Write},
    fs,
    path::Path,
};

use anyhow::{Context, Result};
use geo::Point;
use quick_xml::escape::escape;
use roxmltree::{Document, Node};
use tracing::warn;

use crate::locations::{LocationRecord, Style};

pub const NAMESPACE: &str = "http://www.opengis.net/kml/2.2";

const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <Style id="preferred">
      <IconStyle>
        <Icon>
          <href>http://maps.google.com/mapfiles/ms/icons/red-dot.png</href>
        </Icon>
      </IconStyle>
    </Style>
    <Style id="other">
      <IconStyle>
        <Icon>
          <href>http://maps.google.com/mapfiles/ms/icons/blue-dot.png</href>
        </Icon>
      </IconStyle>
    </Style>"#;

const FOOTER: &str = "\n  </Document>\n</kml>\n";

/// A location as it was written by a previous run.
#[derive(Clone, Debug, PartialEq)]
pub struct ExistingLocation {
    pub style: Style,
    pub point: Point,
    pub address: String,
    pub region: String,
    pub phone: String,
    pub website: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Placemark {
    pub name: String,
    pub address: String,
    pub region: String,
    pub phone: String,
    pub website: String,
    pub rank: String,
    pub point: Point,
}

impl Placemark {
    pub fn new(record: &LocationRecord, point: Point) -> Self {
        Self {
            name: record.organization.clone(),
            address: record.address.clone(),
            region: record.region.clone(),
            phone: record.phone.clone(),
            website: record.website.clone(),
            rank: record.rank.clone(),
            point,
        }
    }

    pub fn style(&self) -> Style {
        Style::from_rank(&self.rank)
    }
}

impl fmt::Display for Placemark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = escape(self.name.as_str());
        let address = escape(self.address.as_str());
        let region = escape(self.region.as_str());
        let phone = escape(self.phone.as_str());
        let website = escape(self.website.as_str());

        writeln!(f)?;
        writeln!(f, "    <Placemark>")?;
        writeln!(f, "      <name>{name}</name>")?;
        writeln!(f, "      <styleUrl>#{}</styleUrl>", self.style())?;
        writeln!(f, "      <description><![CDATA[")?;
        writeln!(f, "        <h3>{name}</h3>")?;
        writeln!(f, "        <p><strong>Address:</strong> {address}</p>")?;
        writeln!(f, "        <p><strong>Region:</strong> {region}</p>")?;
        if !self.phone.is_empty() {
            writeln!(f, "        <p><strong>Phone:</strong> {phone}</p>")?;
        }
        if !self.website.is_empty() {
            writeln!(
                f,
                r#"        <p><strong>Website:</strong> <a href="{website}" target="_blank">Visit Website</a></p>"#
            )?;
        }
        writeln!(
            f,
            "        <p><strong>Type:</strong> {}</p>",
            escape(self.rank.as_str())
        )?;
        writeln!(f, "      ]]></description>")?;
        writeln!(f, "      <ExtendedData>")?;
        for (key, value) in [
            ("address", &address),
            ("region", &region),
            ("phone", &phone),
            ("website", &website),
        ] {
            writeln!(f, r#"        <Data name="{key}"><value>{value}</value></Data>"#)?;
        }
        writeln!(f, "      </ExtendedData>")?;
        writeln!(f, "      <Point>")?;
        writeln!(
            f,
            "        <coordinates>{},{}</coordinates>",
            self.point.x(),
            self.point.y()
        )?;
        writeln!(f, "      </Point>")?;
        write!(f, "    </Placemark>")
    }
}

pub fn assemble(placemarks: &[Placemark]) -> String {
    let mut output = String::from(HEADER);
    for x in placemarks {
        write!(output, "{x}").expect("writing to a String");
    }
    output.push_str(FOOTER);
    output
}

pub fn write(path: &Path, placemarks: &[Placemark]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|x| !x.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, assemble(placemarks))
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Reads a previous output. A missing or broken file is treated as empty.
pub fn parse(path: &Path) -> BTreeMap<String, ExistingLocation> {
    if !path.exists() {
        return BTreeMap::new();
    }

    match fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|x| parse_str(&x))
    {
        Ok(x) => x,
        Err(e) => {
            warn!("Error parsing KML file {}: {e:#}", path.display());
            BTreeMap::new()
        }
    }
}

pub fn parse_str(raw: &str) -> Result<BTreeMap<String, ExistingLocation>> {
    let doc = Document::parse(raw)?;

    let mut output = BTreeMap::new();
    for placemark in doc.descendants().filter(|x| is(x, "Placemark")) {
        let Some(name) = find(placemark, "name").and_then(|x| x.text()) else {
            continue;
        };
        let Some(coords) = find(placemark, "coordinates").and_then(|x| x.text()) else {
            continue;
        };
        let Some(point) = parse_point(coords) else {
            warn!("Malformed coordinates for {name}: {coords}");
            continue;
        };

        let style = find(placemark, "styleUrl")
            .and_then(|x| x.text())
            .map_or(Style::Other, Style::from_style_url);

        let mut data = BTreeMap::new();
        for x in placemark.descendants().filter(|x| is(x, "Data")) {
            if let Some(key) = x.attribute("name") {
                let value = find(x, "value").and_then(|x| x.text()).unwrap_or("");
                data.insert(key, value.trim().to_string());
            }
        }
        let mut field = |key: &str| data.remove(key).unwrap_or_default();

        output.insert(
            name.trim().to_string(),
            ExistingLocation {
                style,
                point,
                address: field("address"),
                region: field("region"),
                phone: field("phone"),
                website: field("website"),
            },
        );
    }

    Ok(output)
}

fn is(node: &Node, name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == name
        && node.tag_name().namespace() == Some(NAMESPACE)
}

fn find<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.descendants().find(|x| is(x, name))
}

// "lon,lat" with an optional trailing altitude
fn parse_point(raw: &str) -> Option<Point> {
    let mut parts = raw.trim().split(',');
    let lon = parts.next()?.trim().parse().ok()?;
    let lat = parts.next()?.trim().parse().ok()?;
    Some(Point::new(lon, lat))
}
