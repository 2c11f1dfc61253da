use std::io::{Read, Seek};

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use super::{BookMetadata, ParsedBook, RawCover};

const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Parse EPUB metadata and cover from a ZIP archive.
/// The reader must implement Read + Seek (for the zip crate).
pub fn parse<R: Read + Seek>(reader: R) -> Result<ParsedBook, EpubError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let package_path = find_package_path(&mut archive)?;
    let package_data = match archive.by_name(&package_path) {
        Ok(entry) => read_to_vec(entry)?,
        Err(zip::result::ZipError::FileNotFound) => return Err(EpubError::MissingPackageDocument),
        Err(e) => return Err(e.into()),
    };

    let package = parse_package(&package_data);
    let cover = extract_cover(&package, &package_path, &mut archive);

    Ok(ParsedBook {
        metadata: package.into_metadata(),
        cover,
    })
}

/// Locate the package document via the container pointer.
fn find_package_path<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> Result<String, EpubError> {
    let data = match archive.by_name(CONTAINER_PATH) {
        Ok(entry) => read_to_vec(entry)?,
        Err(zip::result::ZipError::FileNotFound) => return Err(EpubError::MissingContainer),
        Err(e) => return Err(e.into()),
    };
    parse_container(&data).ok_or(EpubError::MissingPackageDocument)
}

/// Pull the full-path attribute off the first rootfile in container.xml.
fn parse_container(data: &[u8]) -> Option<String> {
    let mut xml = Reader::from_reader(data);
    xml.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Eof) | Err(_) => break,
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if local_name(e.name().as_ref()) == "rootfile" {
                    // First rootfile wins, even when later ones also carry
                    // a full-path attribute.
                    for attr in e.attributes().flatten() {
                        let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                        if key == "full-path" {
                            let val = attr.unescape_value().unwrap_or_default();
                            if !val.is_empty() {
                                return Some(val.to_string());
                            }
                        }
                    }
                    return None;
                }
            }
            _ => {}
        }
        buf.clear();
    }
    None
}

/// Canonical view of the package document, filled in a single pass.
/// Namespace prefixes (`dc:`, `opf:`) are stripped up front so field
/// extraction never has to care whether the source was prefixed.
#[derive(Default)]
struct PackageDoc {
    title: Option<String>,
    creators: Vec<String>,
    subjects: Vec<String>,
    language: Option<String>,
    publisher: Option<String>,
    description: Option<String>,
    series: Option<String>,
    series_index: Option<f64>,
    title_sort: Option<String>,
    cover_id: Option<String>,
    manifest: Vec<ManifestItem>,
}

struct ManifestItem {
    id: String,
    href: String,
    media_type: String,
}

impl PackageDoc {
    fn into_metadata(self) -> BookMetadata {
        // A series index without a series carries no meaning.
        let series_index = self.series.as_ref().and(self.series_index);
        BookMetadata {
            title: self.title.unwrap_or_default(),
            author: self.creators,
            series: self.series,
            series_index,
            title_sort: self.title_sort,
            tags: self.subjects,
            language: self.language,
            publisher: self.publisher,
            description: self.description,
        }
    }
}

/// Parse the package document XML into its canonical shape.
fn parse_package(data: &[u8]) -> PackageDoc {
    let mut doc = PackageDoc::default();
    let mut xml = Reader::from_reader(data);
    xml.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current_text = String::new();

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Eof) | Err(_) => break,

            Ok(Event::Start(ref e)) => {
                let local = local_name(e.name().as_ref());
                handle_open(&local, e, &mut doc);
                path.push(local);
                current_text.clear();
            }

            Ok(Event::Empty(ref e)) => {
                let local = local_name(e.name().as_ref());
                handle_open(&local, e, &mut doc);
                // Self-closing: don't push to path
            }

            Ok(Event::End(ref _e)) => {
                let tag = path.last().map(|s| s.as_str()).unwrap_or("");
                let text = current_text.trim().to_string();

                if in_metadata(&path) && !text.is_empty() {
                    match tag {
                        "title" if doc.title.is_none() => doc.title = Some(text),
                        "creator" => doc.creators.push(text),
                        // Duplicate subjects are kept as-is
                        "subject" => doc.subjects.push(text),
                        "language" if doc.language.is_none() => doc.language = Some(text),
                        "publisher" if doc.publisher.is_none() => doc.publisher = Some(text),
                        "description" if doc.description.is_none() => doc.description = Some(text),
                        _ => {}
                    }
                }

                if !path.is_empty() {
                    path.pop();
                }
                current_text.clear();
            }

            Ok(Event::Text(ref e)) => {
                if let Ok(text) = e.decode() {
                    current_text.push_str(&text);
                }
            }

            _ => {}
        }
        buf.clear();
    }

    doc
}

/// Handle attributes on a Start or Empty element: manifest items plus the
/// `<meta name=... content=...>` vendor extensions.
fn handle_open(local: &str, e: &quick_xml::events::BytesStart<'_>, doc: &mut PackageDoc) {
    match local {
        "meta" => {
            let mut name_attr = String::new();
            let mut content_attr = String::new();
            for attr in e.attributes().flatten() {
                let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                let val = attr.unescape_value().unwrap_or_default();
                match key {
                    "name" => name_attr = val.to_string(),
                    "content" => content_attr = val.to_string(),
                    _ => {}
                }
            }
            match name_attr.as_str() {
                "calibre:series" if !content_attr.is_empty() => {
                    doc.series = Some(content_attr);
                }
                "calibre:series_index" => {
                    // Non-numeric values mean "no index", not an error
                    doc.series_index = content_attr.parse::<f64>().ok().filter(|v| v.is_finite());
                }
                "calibre:title_sort" if !content_attr.is_empty() => {
                    doc.title_sort = Some(content_attr);
                }
                "cover" if !content_attr.is_empty() => {
                    doc.cover_id = Some(content_attr);
                }
                _ => {}
            }
        }
        "item" => {
            let mut item = ManifestItem {
                id: String::new(),
                href: String::new(),
                media_type: String::new(),
            };
            for attr in e.attributes().flatten() {
                let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                let val = attr.unescape_value().unwrap_or_default();
                match key {
                    "id" => item.id = val.to_string(),
                    "href" => item.href = val.to_string(),
                    "media-type" => item.media_type = val.to_string(),
                    _ => {}
                }
            }
            if !item.id.is_empty() && !item.href.is_empty() {
                doc.manifest.push(item);
            }
        }
        _ => {}
    }
}

/// Resolve the cover named by the cover meta against the manifest and read
/// its bytes. Hrefs are relative to the package document's directory, not
/// the archive root. A dangling reference yields no cover, not an error.
fn extract_cover<R: Read + Seek>(
    doc: &PackageDoc,
    package_path: &str,
    archive: &mut zip::ZipArchive<R>,
) -> Option<RawCover> {
    let cover_id = doc.cover_id.as_deref()?;
    let item = doc.manifest.iter().find(|m| m.id == cover_id)?;
    let path = resolve_href(package_dir(package_path), &item.href);
    let data = read_zip_entry(archive, &path)?;
    Some(RawCover {
        data,
        media_type: item.media_type.clone(),
    })
}

fn package_dir(package_path: &str) -> &str {
    match package_path.rfind('/') {
        Some(i) => &package_path[..=i],
        None => "",
    }
}

fn resolve_href(base_dir: &str, href: &str) -> String {
    match href.strip_prefix('/') {
        Some(abs) => abs.to_string(),
        None => format!("{base_dir}{href}"),
    }
}

fn local_name(raw: &[u8]) -> String {
    let s = std::str::from_utf8(raw).unwrap_or("");
    match s.rfind(':') {
        Some(i) => s[i + 1..].to_lowercase(),
        None => s.to_lowercase(),
    }
}

fn in_metadata(path: &[String]) -> bool {
    path.iter().any(|s| s == "metadata")
}

fn read_to_vec(mut entry: impl Read) -> Result<Vec<u8>, std::io::Error> {
    let mut data = Vec::new();
    entry.read_to_end(&mut data)?;
    Ok(data)
}

fn read_zip_entry<R: Read + Seek>(archive: &mut zip::ZipArchive<R>, name: &str) -> Option<Vec<u8>> {
    let entry = archive.by_name(name).ok()?;
    read_to_vec(entry).ok()
}

#[derive(Debug, thiserror::Error)]
pub enum EpubError {
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing META-INF/container.xml")]
    MissingContainer,
    #[error("container.xml names no package document")]
    MissingPackageDocument,
}
