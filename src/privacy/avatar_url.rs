// Avatar URL construction for a computed identity hash. Builds links only; nothing is fetched.
use serde::{Deserialize, Serialize};
use url::Url;

use crate::privacy::engine::ObfuscationEngine;

pub const DEFAULT_SIZE: u32 = 96;
const MD5_ADDRESS_SUFFIX: &str = "@md5.gravatar.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvatarOptions {
    #[serde(default = "default_size")]
    pub size: u32,
    /// `mm`/`mystery`/`mysteryman`, `gravatar_default`, a keyword such as `identicon`, or an image URL.
    #[serde(default = "default_image")]
    pub default_image: String,
    #[serde(default)]
    pub force_default: bool,
    #[serde(default = "default_rating")]
    pub rating: String,
    #[serde(default = "default_secure")]
    pub secure: bool,
}

fn default_size() -> u32 {
    DEFAULT_SIZE
}

fn default_image() -> String {
    "mm".to_string()
}

fn default_rating() -> String {
    "g".to_string()
}

fn default_secure() -> bool {
    true
}

impl Default for AvatarOptions {
    fn default() -> Self {
        Self {
            size: DEFAULT_SIZE,
            default_image: default_image(),
            force_default: false,
            rating: default_rating(),
            secure: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AvatarData {
    pub hash: String,
    pub obfuscated: bool,
    pub url: String,
    /// Same image at twice the size, for `srcset`.
    pub url_2x: String,
}

/// Value for the `d` parameter, or `None` to let the service show its own logo.
pub fn default_image_param(raw: &str) -> Option<String> {
    match raw.trim() {
        "" | "mm" | "mystery" | "mysteryman" => Some("mm".to_string()),
        "gravatar_default" => None,
        other => Some(other.to_string()),
    }
}

pub fn avatar_url(hash: &str, options: &AvatarOptions) -> Result<String, String> {
    let base = if options.secure {
        format!("https://secure.gravatar.com/avatar/{}", hash)
    } else {
        // Spread plain-http requests over the numbered hosts by the hash's first digit.
        let server = hash
            .chars()
            .next()
            .and_then(|c| c.to_digit(16))
            .unwrap_or(0)
            % 3;
        format!("http://{}.gravatar.com/avatar/{}", server, hash)
    };
    let mut url = Url::parse(&base).map_err(|e| format!("Invalid avatar URL: {}", e))?;

    let size = if options.size == 0 { DEFAULT_SIZE } else { options.size };
    let mut params: Vec<(&str, String)> = vec![("s", size.to_string())];
    if let Some(d) = default_image_param(&options.default_image) {
        params.push(("d", d));
    }
    if options.force_default {
        params.push(("f", "y".to_string()));
    }
    let rating = options.rating.trim().to_lowercase();
    if !rating.is_empty() {
        params.push(("r", rating));
    }

    url.query_pairs_mut().extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
    Ok(url.into())
}

/// Hash an address (or accept a precomputed `<hash>@md5.gravatar.com`) and build its URLs.
pub fn resolve_avatar(
    engine: &ObfuscationEngine,
    id_or_email: &str,
    options: &AvatarOptions,
) -> Result<AvatarData, String> {
    let (hash, obfuscated) = match precomputed_hash(id_or_email) {
        Some(hash) => (hash, false),
        None => {
            let identity = engine.compute_identity_hash(id_or_email);
            let obfuscated = identity.is_obfuscated();
            (identity.into_string(), obfuscated)
        }
    };

    let url = avatar_url(&hash, options)?;
    let size = if options.size == 0 { DEFAULT_SIZE } else { options.size };
    let doubled = AvatarOptions {
        size: size.saturating_mul(2),
        ..options.clone()
    };
    let url_2x = avatar_url(&hash, &doubled)?;

    Ok(AvatarData {
        hash,
        obfuscated,
        url,
        url_2x,
    })
}

fn precomputed_hash(input: &str) -> Option<String> {
    let input = input.trim().to_lowercase();
    let hash = input.strip_suffix(MD5_ADDRESS_SUFFIX)?;
    if hash.len() == 32 && hash.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(hash.to_string())
    } else {
        None
    }
}
