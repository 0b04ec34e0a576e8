//! Small helpers over `scraper` element trees.

use scraper::ElementRef;
use url::Url;

use crate::normalize::normalize_spaces;

/// Visible text of an element, whitespace collapsed
pub fn text_of(element: ElementRef<'_>) -> String {
    normalize_spaces(&element.text().collect::<Vec<_>>().join(" "))
}

/// Closest ancestor that is an element
pub fn parent_element<'a>(element: ElementRef<'a>) -> Option<ElementRef<'a>> {
    element.parent().and_then(ElementRef::wrap)
}

/// Resolve a possibly protocol-relative or relative link against `base`.
///
/// Returns `None` for empty values and for anything that does not end up
/// as an http(s) URL (data URIs, javascript links).
pub fn absolutize(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let resolved = if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        Url::parse(base).ok()?.join(href).ok()?.to_string()
    };
    if resolved.starts_with("http://") || resolved.starts_with("https://") {
        Some(resolved)
    } else {
        None
    }
}

/// Follow a DuckDuckGo `/l/?uddg=` redirect to its target, if `href` is one.
pub fn unwrap_search_redirect(href: &str) -> String {
    let href = href.trim();
    if !href.contains("duckduckgo.com/l/") {
        return href.to_string();
    }
    let absolute = match href.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => href.to_string(),
    };
    Url::parse(&absolute)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .filter(|target| !target.is_empty())
        .unwrap_or_else(|| href.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolutize_handles_relative_forms() {
        let base = "https://www.ebay.fr/itm/123";
        assert_eq!(absolutize(base, "//i.ebayimg.com/a.jpg").unwrap(), "https://i.ebayimg.com/a.jpg");
        assert_eq!(absolutize(base, "/img/a.png").unwrap(), "https://www.ebay.fr/img/a.png");
        assert_eq!(absolutize(base, "a.png").unwrap(), "https://www.ebay.fr/itm/a.png");
        assert_eq!(absolutize(base, "https://x.y/z").unwrap(), "https://x.y/z");
        assert!(absolutize(base, "   ").is_none());
        assert!(absolutize(base, "data:image/png;base64,AAAA").is_none());
    }

    #[test]
    fn search_redirect_is_unwrapped() {
        let href = "//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.leboncoin.fr%2Fad%2Ftelephones%2F2456789012&rut=abc";
        assert_eq!(
            unwrap_search_redirect(href),
            "https://www.leboncoin.fr/ad/telephones/2456789012"
        );
        assert_eq!(unwrap_search_redirect("https://example.com/x"), "https://example.com/x");
    }
}
