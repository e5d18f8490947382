use crate::models::ListPage;

/// PageQuery
///
/// Query string accepted by every list route. The page is kept as raw text so that
/// junk such as `?page=abc` is clamped instead of rejected.
#[derive(Debug, Default, PartialEq, Eq, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1-based page number, or `last`.
    pub page: Option<String>,
}

impl PageQuery {
    /// Reads `page` from a raw query string. A repeated `page` keeps its last value,
    /// and nothing in the query can make the list fail.
    pub fn from_raw(query: Option<&str>) -> Self {
        let page = query.and_then(|raw| {
            url::form_urlencoded::parse(raw.as_bytes())
                .filter(|(key, _)| key == "page")
                .map(|(_, value)| value.into_owned())
                .last()
        });
        Self { page }
    }
}

/// Total number of pages for `count` rows; an empty listing still has one page.
pub fn num_pages(count: i64, per_page: i64) -> i64 {
    if count <= 0 || per_page <= 0 {
        1
    } else {
        (count + per_page - 1) / per_page
    }
}

/// resolve
///
/// Maps the requested page onto `1..=num_pages`. Missing or non-numeric input yields
/// the first page. `last` and any number outside the range, whether below 1, past the
/// end or too long for an `i64`, yield the last page.
pub fn resolve(requested: Option<&str>, count: i64, per_page: i64) -> (i64, i64) {
    let num_pages = num_pages(count, per_page);
    let page = match requested.map(str::trim) {
        Some("last") => num_pages,
        Some(raw) => match raw.parse::<i64>() {
            Ok(n) if (1..=num_pages).contains(&n) => n,
            Ok(_) => num_pages,
            Err(_) if is_integer(raw) => num_pages,
            Err(_) => 1,
        },
        None => 1,
    };
    (page, num_pages)
}

/// An optionally signed run of ASCII digits, whatever its magnitude.
fn is_integer(raw: &str) -> bool {
    let digits = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Assembles a `ListPage`, including `?page=N` links relative to `base_url`.
pub fn page_of<T>(
    items: Vec<T>,
    page: i64,
    num_pages: i64,
    count: i64,
    per_page: Option<i64>,
    base_url: &str,
) -> ListPage<T> {
    let link = |n: i64| format!("{}?page={}", base_url, n);
    let has_previous = page > 1;
    let has_next = page < num_pages;
    ListPage {
        items,
        page,
        num_pages,
        count,
        per_page,
        has_previous,
        has_next,
        previous_url: has_previous.then(|| link(page - 1)),
        next_url: has_next.then(|| link(page + 1)),
    }
}
