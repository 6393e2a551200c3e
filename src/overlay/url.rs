//! Tile URL templates.
//!
//! A template is a provider URL with an optional `{a,b,c}` subdomain group and
//! a `{z}/{x}/{y}` placeholder, e.g. `http://{a,b,c}.tile.example.org/{z}/{x}/{y}.png`.
//! Without the placeholder, `<zoom>/<x>/<y>.png` is appended to the URL.

use crate::error::TemplateError;
use crate::overlay::TileAddress;

const TILE_COORDS_TEMPLATE: &str = "{z}/{x}/{y}";

/// Characters that can't appear in a cache directory name
const PROHIBITED_CHARACTERS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Parsed tile URL template.
///
/// Tile URLs are `start + subdomain + mid + "z/x/y" + end`, where the
/// subdomain rotates with the request sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileUrlTemplate {
    url_start: String,
    subdomains: Vec<String>,
    url_mid: String,
    url_end: String,
}

impl TileUrlTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut url = template.trim().to_string();
        if url.is_empty() {
            return Err(TemplateError::Empty);
        }

        // Where the subdomain group search stops: the placeholder, or the end
        let coords_position = url.find(TILE_COORDS_TEMPLATE).filter(|&pos| pos > 0);
        let (subdomains_end, url_end) = match coords_position {
            Some(pos) => (pos, url[pos + TILE_COORDS_TEMPLATE.len()..].to_string()),
            None => {
                if !url.ends_with('/') {
                    url.push('/');
                }
                (url.len(), ".png".to_string())
            }
        };

        let group = url[..subdomains_end].find('{').and_then(|left| {
            url[left + 1..subdomains_end].find('}').map(|right| (left, left + 1 + right))
        });

        match group {
            Some((left, right)) => {
                let subdomains: Vec<String> = url[left + 1..right]
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect();
                if subdomains.iter().any(String::is_empty) {
                    return Err(TemplateError::EmptySubdomains(template.to_string()));
                }
                Ok(Self {
                    url_start: url[..left].to_string(),
                    subdomains,
                    url_mid: url[right + 1..subdomains_end].to_string(),
                    url_end,
                })
            }
            None if coords_position.is_some() => Ok(Self {
                url_start: url[..subdomains_end].to_string(),
                subdomains: Vec::new(),
                url_mid: String::new(),
                url_end,
            }),
            None => Err(TemplateError::NoPlaceholder(template.to_string())),
        }
    }

    /// URL of `address`. `request_seq` picks the subdomain round-robin.
    pub fn url(&self, address: TileAddress, request_seq: u64) -> String {
        let subdomain = if self.subdomains.is_empty() {
            ""
        } else {
            self.subdomains[(request_seq % self.subdomains.len() as u64) as usize].as_str()
        };
        format!(
            "{}{}{}{}/{}/{}{}",
            self.url_start, subdomain, self.url_mid, address.zoom, address.x, address.y, self.url_end
        )
    }

    pub fn subdomains(&self) -> &[String] {
        &self.subdomains
    }

    /// Directory name for this provider's tiles in the cache: the URL without
    /// scheme, subdomains joined, prohibited characters replaced with `!`.
    pub fn cache_subdir(&self) -> String {
        let start = self
            .url_start
            .strip_prefix("http://")
            .or_else(|| self.url_start.strip_prefix("https://"))
            .unwrap_or(&self.url_start);
        let raw = if self.subdomains.is_empty() {
            start.trim_end_matches('/').to_string()
        } else {
            format!("{}{}{}", start, self.subdomains.concat(), self.url_mid.trim_end_matches('/'))
        };
        raw.chars()
            .map(|c| if PROHIBITED_CHARACTERS.contains(&c) { '!' } else { c })
            .collect()
    }

    /// File extension for cached tiles.
    pub fn image_extension(&self) -> &'static str {
        let end = self.url_end.to_ascii_lowercase();
        let path = end.split('?').next().unwrap_or_default();
        if path.ends_with(".jpg") || path.ends_with(".jpeg") {
            "jpg"
        } else {
            "png"
        }
    }
}
