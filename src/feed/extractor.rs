use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

/// Errors raised before any node is visited.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A configured selector is not valid CSS
    #[error("Invalid {field} selector '{selector}': {reason}")]
    InvalidSelector {
        field: &'static str,
        selector: String,
        reason: String,
    },
}

/// The CSS selectors of one feed definition.
///
/// `date` and `description` are optional; an empty string counts as unset.
#[derive(Debug, Clone, Copy)]
pub struct Selectors<'a> {
    pub item: &'a str,
    pub title: &'a str,
    pub link: &'a str,
    pub date: Option<&'a str>,
    pub description: Option<&'a str>,
}

/// One candidate item as found on the page, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawItem {
    pub title: String,
    /// `href` of the link match as written (possibly relative), or its text
    pub link: String,
    /// Inner HTML of the description match, or of the whole item node
    pub description: String,
    /// Date text cut at the first space; empty when no date selector is set
    pub date_text: String,
}

/// [`Selectors`] parsed into scraper selectors, ready to run on any page.
#[derive(Debug)]
pub struct CompiledSelectors {
    item: Selector,
    title: Selector,
    link: Selector,
    date: Option<Selector>,
    description: Option<Selector>,
}

fn compile(field: &'static str, selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
        field,
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn compile_optional(
    field: &'static str,
    selector: Option<&str>,
) -> Result<Option<Selector>, ExtractError> {
    match selector.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => compile(field, s).map(Some),
        None => Ok(None),
    }
}

impl Selectors<'_> {
    /// Parse every configured selector.
    ///
    /// # Errors
    ///
    /// [`ExtractError::InvalidSelector`] naming the first field that is not
    /// valid CSS, in the order item, title, link, date, description.
    pub fn compile(&self) -> Result<CompiledSelectors, ExtractError> {
        Ok(CompiledSelectors {
            item: compile("item", self.item)?,
            title: compile("title", self.title)?,
            link: compile("link", self.link)?,
            date: compile_optional("date", self.date)?,
            description: compile_optional("description", self.description)?,
        })
    }
}

/// Pull candidate items out of an HTML page.
///
/// Every node matching `item` yields one [`RawItem`], in document order. The
/// other selectors are matched among that node's descendants and only their
/// first match is used; a selector that matches nothing gives an empty field.
/// Malformed HTML is parsed best-effort and never fails.
///
/// # Errors
///
/// [`ExtractError::InvalidSelector`] if any configured selector fails to
/// compile. Selectors are compiled before the document is parsed.
pub fn extract(html: &str, selectors: &Selectors<'_>) -> Result<Vec<RawItem>, ExtractError> {
    let compiled = selectors.compile()?;
    Ok(extract_compiled(html, &compiled))
}

/// [`extract`] with selectors compiled ahead of time.
pub fn extract_compiled(html: &str, compiled: &CompiledSelectors) -> Vec<RawItem> {
    let document = Html::parse_document(html);

    document
        .select(&compiled.item)
        .map(|node| extract_item(node, compiled))
        .collect()
}

fn extract_item(node: ElementRef<'_>, compiled: &CompiledSelectors) -> RawItem {
    let title = node
        .select(&compiled.title)
        .next()
        .map(text_of)
        .unwrap_or_default();

    let link = node
        .select(&compiled.link)
        .next()
        .map(|el| match el.value().attr("href") {
            Some(href) => href.to_string(),
            None => text_of(el),
        })
        .unwrap_or_default();

    let description = match &compiled.description {
        Some(sel) => node
            .select(sel)
            .next()
            .map(|el| el.inner_html())
            .unwrap_or_default(),
        None => node.inner_html(),
    };

    let date_text = compiled
        .date
        .as_ref()
        .and_then(|sel| node.select(sel).next())
        .map(|el| first_word(&text_of(el)).to_string())
        .unwrap_or_default();

    RawItem {
        title,
        link,
        description,
        date_text,
    }
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// "2025-08-09 (Sat)" -> "2025-08-09"
fn first_word(text: &str) -> &str {
    text.split_once(' ').map_or(text, |(head, _)| head)
}
