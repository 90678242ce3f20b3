use url::Url;

/// Resolve a scraped `href` against the URL the page was served from.
///
/// Relative, root-relative, protocol-relative and absolute references all go
/// through `Url::join`. Blank input yields an empty string; a reference that
/// cannot be resolved is returned as-is.
pub fn resolve_link(href: &str, base: &Url) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }

    match base.join(href) {
        Ok(resolved) => resolved.to_string(),
        Err(e) => {
            tracing::debug!(href = %href, base = %base, error = %e, "Link left unresolved");
            href.to_string()
        }
    }
}
