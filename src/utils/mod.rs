use url::Url;

/// Archive name used when the page title sanitizes to nothing.
pub const DEFAULT_ARCHIVE_NAME: &str = "reddit_gallery";

/// Turns a page title into a safe archive base name: letters and digits are
/// kept, whitespace becomes `_`, everything else is dropped.
pub fn sanitize_archive_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .collect();

    if cleaned.is_empty() {
        DEFAULT_ARCHIVE_NAME.to_string()
    } else {
        cleaned
    }
}

/// Download filename for a single asset: the URL's last path segment with
/// its extension swapped for `extension`, or `image<extension>`.
pub fn asset_filename(asset_url: &str, extension: &str) -> String {
    let base = Url::parse(asset_url).ok().and_then(|url| {
        url.path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
    });

    match base {
        Some(base) if base.contains('.') => {
            let stem = match base.rfind('.') {
                Some(idx) => &base[..idx],
                None => base.as_str(),
            };
            format!("{}{}", stem, extension)
        }
        _ => format!("image{}", extension),
    }
}

/// Archive entry name: `image_<3-digit 1-based index><extension>`.
pub fn entry_name(index: usize, extension: &str) -> String {
    format!("image_{:03}{}", index, extension)
}

/// Decodes HTML character references in a single pass.
pub fn unescape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];

        match candidate.find(';').and_then(|end| {
            decode_entity(&candidate[1..end]).map(|decoded| (decoded, end))
        }) {
            Some((decoded, end)) => {
                out.push(decoded);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let numeric = name.strip_prefix('#')?;
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
