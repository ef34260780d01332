//! Text rendering utilities for human-friendly error messages.
//!
//! Provides helpers to format resolution chains, service names,
//! and "did you mean?" suggestions in error output.

/// Renders a resolution chain as a readable string.
///
/// # Examples
/// ```
/// use khazin_support::rendering::render_chain;
///
/// let chain = vec!["OrderService", "PaymentGateway", "OrderService"];
/// let rendered = render_chain(&chain);
/// assert_eq!(rendered, "OrderService → PaymentGateway → OrderService");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    chain
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Renders a bounded sample of names, noting how many were left out.
///
/// `total` is the size of the full collection the sample was taken from.
///
/// ```
/// use khazin_support::rendering::render_sample;
///
/// assert_eq!(render_sample(&["Cache", "Mailer"], 2), "Cache, Mailer");
/// assert_eq!(render_sample(&["Cache", "Mailer"], 5), "Cache, Mailer (+3 more)");
/// assert_eq!(render_sample(&[] as &[&str], 0), "<none>");
/// ```
pub fn render_sample(sample: &[impl AsRef<str>], total: usize) -> String {
    if sample.is_empty() {
        return "<none>".to_string();
    }

    let mut out = sample
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(", ");

    if total > sample.len() {
        out.push_str(&format!(" (+{} more)", total - sample.len()));
    }
    out
}

/// Shortens a fully qualified type name for display.
///
/// ```
/// use khazin_support::rendering::shorten_type_name;
///
/// let short = shorten_type_name("shop::billing::InvoiceService");
/// assert_eq!(short, "InvoiceService");
///
/// let short = shorten_type_name("alloc::sync::Arc<dyn shop::ports::Clock>");
/// assert_eq!(short, "Arc<dyn Clock>");
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    full_name
        .split_inclusive(DELIMITERS)
        .map(|piece| {
            let path = piece.strip_suffix(DELIMITERS).unwrap_or(piece);
            let delimiter = &piece[path.len()..];
            let name = path.rsplit("::").next().unwrap_or(path);
            format!("{name}{delimiter}")
        })
        .collect()
}

/// Characters that separate path segments inside a type name.
const DELIMITERS: [char; 10] = ['<', '>', ',', ' ', '(', ')', '[', ']', ';', '&'];

/// Generates "did you mean?" suggestions from the available names.
///
/// Names are compared by their shortened, lowercased form. A name that
/// contains the request (or is contained in it) ranks first; others must
/// be within a small edit distance. Ties are broken alphabetically.
///
/// ```
/// use khazin_support::rendering::suggest_similar;
///
/// let available = ["shop::Mailer", "shop::Clock"];
/// assert_eq!(suggest_similar("shop::Mailr", &available, 3), vec!["shop::Mailer"]);
/// ```
pub fn suggest_similar(
    requested: &str,
    available: &[&str],
    max_suggestions: usize,
) -> Vec<String> {
    let wanted = shorten_type_name(requested).to_lowercase();
    let tolerance = (wanted.chars().count() / 3).max(2);

    let mut ranked: Vec<(usize, &str)> = available
        .iter()
        .copied()
        .filter(|name| !name.eq_ignore_ascii_case(requested))
        .filter_map(|name| {
            let candidate = shorten_type_name(name).to_lowercase();
            if candidate.len() >= 3 && (candidate.contains(&wanted) || wanted.contains(&candidate)) {
                return Some((0, name));
            }
            let distance = edit_distance(&wanted, &candidate);
            (distance <= tolerance).then_some((distance, name))
        })
        .collect();

    ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    ranked
        .into_iter()
        .take(max_suggestions)
        .map(|(_, name)| name.to_string())
        .collect()
}

/// Levenshtein distance over chars, two rows at a time.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
