#![warn(missing_docs)]
//! # ecomops-render
//!
//! ## Purpose
//! Turns backend snapshots into HTML fragments keyed by page element id.
//!
//! ## Responsibilities
//! - KPI cards for the dashboard summary and financial summary.
//! - Per-channel ranking bars scaled to the largest value.
//! - Upload list items and per-website breakdown cards.
//! - en-IN number and rupee formatting.
//!
//! ## Data flow
//! [`DashboardSummary`] / [`FinancialSummary`] / [`UploadRecord`] list ->
//! `render_*` -> [`Fragment`] values -> page view.
//!
//! ## Ownership and lifetimes
//! Renderers borrow the snapshot and return owned fragments; nothing is
//! cached between fetches.
//!
//! ## Error model
//! Rendering cannot fail. Missing or non-finite numbers render as zero.
//!
//! ## Security and privacy notes
//! Every interpolated string goes through [`escape_html`].

use std::fmt::Write as _;

use ecomops_core::{DashboardSummary, FinancialSummary, UploadRecord, UploadStatus};

/// Currency glyph prefixed to every amount.
pub const CURRENCY_GLYPH: &str = "₹";

/// Element ids of the dashboard KPI cards.
pub mod ids {
    /// Welcome line.
    pub const MESSAGE: &str = "message";
    /// Upload list.
    pub const FILE_LIST: &str = "fileList";
    /// Shipped order count card.
    pub const SHIPPED_ORDERS: &str = "shippedOrders";
    /// Cancelled order count card.
    pub const CANCELLED_ORDERS: &str = "cancelledOrders";
    /// Returned order count card.
    pub const RETURNED_ORDERS: &str = "returnedOrders";
    /// Order value card.
    pub const TOTAL_ORDER_VALUE: &str = "totalOrderValue";
    /// Paid card.
    pub const TOTAL_PAID: &str = "totalPaid";
    /// Charges card.
    pub const TOTAL_CHARGES: &str = "totalCharges";
    /// Outstanding card.
    pub const TOTAL_OUTSTANDING: &str = "totalOutstanding";
    /// Orders-by-channel ranking.
    pub const ORDERS_BY_WEBSITE: &str = "ordersByWebsite";
    /// Per-website breakdown cards.
    pub const WEBSITE_CARDS: &str = "websiteCards";
    /// Financial order value card.
    pub const FIN_ORDER_VALUE: &str = "finOrderValue";
    /// Financial paid card.
    pub const FIN_PAID: &str = "finPaid";
    /// Financial charges card.
    pub const FIN_CHARGES: &str = "finCharges";
    /// Financial outstanding card.
    pub const FIN_OUTSTANDING: &str = "finOutstanding";
    /// Outstanding-by-channel ranking.
    pub const OUTSTANDING_BY_WEBSITE: &str = "outstandingByWebsite";
}

/// HTML destined for one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Target element id.
    pub element_id: String,
    /// Inner HTML.
    pub html: String,
}

impl Fragment {
    /// Creates a fragment.
    pub fn new(element_id: &str, html: impl Into<String>) -> Self {
        Self {
            element_id: element_id.to_string(),
            html: html.into(),
        }
    }
}

/// How a ranking renders its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    /// Grouped integer.
    Count,
    /// Rupee amount.
    Currency,
}

/// One ranked channel with its bar width.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedBar {
    /// Channel name.
    pub channel: String,
    /// Channel value (non-negative, finite).
    pub value: f64,
    /// Bar width in percent of the largest value.
    pub width_pct: f64,
}

/// Escapes text for HTML element and attribute context.
pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Applies en-IN digit grouping (`12,34,567`) to a run of ASCII digits.
fn group_indian(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }

    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(2);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();
    format!("{},{}", groups.join(","), tail)
}

/// Formats a count with en-IN grouping.
pub fn format_count(value: u64) -> String {
    group_indian(&value.to_string())
}

/// Formats a rupee amount: en-IN grouping, two decimals, `₹` prefix.
///
/// ```rust
/// use ecomops_render::format_inr;
///
/// assert_eq!(format_inr(45000.5), "₹45,000.50");
/// assert_eq!(format_inr(1234567.0), "₹12,34,567.00");
/// ```
pub fn format_inr(value: f64) -> String {
    let value = if value.is_finite() { value } else { 0.0 };
    let fixed = format!("{:.2}", value.abs());
    let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{CURRENCY_GLYPH}{}.{fraction}", group_indian(integer))
}

fn format_value(value: f64, format: ValueFormat) -> String {
    match format {
        ValueFormat::Count => format_count(value.max(0.0).round() as u64),
        ValueFormat::Currency => format_inr(value),
    }
}

fn format_pct(width_pct: f64) -> String {
    if width_pct.fract() == 0.0 {
        format!("{width_pct:.0}%")
    } else {
        format!("{width_pct:.1}%")
    }
}

/// Sorts channels by descending value and scales bars to the maximum.
///
/// Ties sort by channel name. Negative or non-finite values count as zero.
/// A lone channel is always 100% wide; otherwise, when every value is zero,
/// all bars are 0% wide.
pub fn rank_channels<I, S>(entries: I) -> Vec<RankedBar>
where
    I: IntoIterator<Item = (S, f64)>,
    S: Into<String>,
{
    let mut bars: Vec<RankedBar> = entries
        .into_iter()
        .map(|(channel, value)| RankedBar {
            channel: channel.into(),
            value: if value.is_finite() { value.max(0.0) } else { 0.0 },
            width_pct: 0.0,
        })
        .collect();

    bars.sort_by(|a, b| {
        b.value
            .total_cmp(&a.value)
            .then_with(|| a.channel.cmp(&b.channel))
    });

    let max = bars.first().map(|bar| bar.value).unwrap_or(0.0);
    if let [only] = bars.as_mut_slice() {
        only.width_pct = 100.0;
    } else if max > 0.0 {
        for bar in &mut bars {
            bar.width_pct = bar.value / max * 100.0;
        }
    }
    bars
}

/// Renders a ranking as a list of progress bars.
pub fn render_channel_ranking(element_id: &str, bars: &[RankedBar], format: ValueFormat) -> Fragment {
    let mut html = String::from("<ul class=\"ranking\">");
    for bar in bars {
        let _ = write!(
            html,
            "<li><span class=\"label\">{}</span><div class=\"bar\"><div class=\"fill\" style=\"width: {}\"></div></div><span class=\"value\">{}</span></li>",
            escape_html(&bar.channel),
            format_pct(bar.width_pct),
            format_value(bar.value, format)
        );
    }
    html.push_str("</ul>");
    Fragment::new(element_id, html)
}

/// Orders-per-channel ranking input.
pub fn orders_by_website(summary: &DashboardSummary) -> Vec<RankedBar> {
    rank_channels(
        summary
            .by_website
            .iter()
            .map(|(site, stats)| (site.as_str(), stats.orders as f64)),
    )
}

/// Outstanding-per-channel ranking input.
pub fn outstanding_by_website(summary: &FinancialSummary) -> Vec<RankedBar> {
    rank_channels(
        summary
            .by_website
            .iter()
            .map(|(site, stats)| (site.as_str(), stats.outstanding)),
    )
}

/// Renders the seven dashboard KPI cards.
pub fn render_summary_cards(summary: &DashboardSummary) -> Vec<Fragment> {
    vec![
        Fragment::new(ids::SHIPPED_ORDERS, format_count(summary.shipped_orders)),
        Fragment::new(ids::CANCELLED_ORDERS, format_count(summary.cancelled_orders)),
        Fragment::new(ids::RETURNED_ORDERS, format_count(summary.returned_orders)),
        Fragment::new(ids::TOTAL_ORDER_VALUE, format_inr(summary.total_order_value)),
        Fragment::new(ids::TOTAL_PAID, format_inr(summary.total_paid)),
        Fragment::new(ids::TOTAL_CHARGES, format_inr(summary.total_charges)),
        Fragment::new(ids::TOTAL_OUTSTANDING, format_inr(summary.total_outstanding)),
    ]
}

/// Renders one card per website, ordered by descending order count.
pub fn render_website_cards(summary: &DashboardSummary) -> Fragment {
    let mut html = String::new();
    for bar in orders_by_website(summary) {
        let Some(stats) = summary.by_website.get(&bar.channel) else {
            continue;
        };
        let _ = write!(
            html,
            "<div class=\"card\"><h3>{}</h3><ul><li>Orders: {}</li><li>Paid: {}</li><li>Charges: {}</li><li>Order Value: {}</li><li>Outstanding: {}</li></ul></div>",
            escape_html(&bar.channel),
            format_count(stats.orders),
            format_inr(stats.paid),
            format_inr(stats.charges),
            format_inr(stats.order_value),
            format_inr(stats.outstanding)
        );
    }
    Fragment::new(ids::WEBSITE_CARDS, html)
}

/// Renders every dashboard summary widget.
pub fn render_dashboard(summary: &DashboardSummary) -> Vec<Fragment> {
    let mut fragments = render_summary_cards(summary);
    fragments.push(render_channel_ranking(
        ids::ORDERS_BY_WEBSITE,
        &orders_by_website(summary),
        ValueFormat::Count,
    ));
    fragments.push(render_website_cards(summary));
    fragments
}

/// Renders the financial summary cards and outstanding ranking.
pub fn render_financial_cards(summary: &FinancialSummary) -> Vec<Fragment> {
    vec![
        Fragment::new(ids::FIN_ORDER_VALUE, format_inr(summary.total_order_value)),
        Fragment::new(ids::FIN_PAID, format_inr(summary.total_paid)),
        Fragment::new(ids::FIN_CHARGES, format_inr(summary.total_charges)),
        Fragment::new(ids::FIN_OUTSTANDING, format_inr(summary.total_outstanding)),
        render_channel_ranking(
            ids::OUTSTANDING_BY_WEBSITE,
            &outstanding_by_website(summary),
            ValueFormat::Currency,
        ),
    ]
}

fn status_badge(record: &UploadRecord) -> String {
    let class = match record.status {
        UploadStatus::Completed => "done",
        UploadStatus::Failed => "failed",
        UploadStatus::Pending | UploadStatus::InProgress | UploadStatus::Other(_) => "running",
    };
    let mut label = escape_html(record.status.as_str());
    if let Some(progress) = record.progress
        && !record.status.is_terminal()
    {
        let _ = write!(label, " {}%", progress.min(100));
    }
    if let Some(message) = record.message.as_deref().filter(|message| !message.is_empty()) {
        let _ = write!(label, " – {}", escape_html(message));
    }
    format!("<span class=\"status {class}\">{label}</span>")
}

/// Renders the upload list items.
pub fn render_upload_list(records: &[UploadRecord]) -> Fragment {
    let mut html = String::new();
    for record in records {
        let _ = write!(
            html,
            "<li><strong>{}</strong> – {} ({})",
            escape_html(&record.website),
            escape_html(&record.report_type),
            escape_html(&record.duration)
        );
        if is_web_link(&record.file_url) {
            let _ = write!(
                html,
                " – <a href=\"{}\" target=\"_blank\">View</a>",
                escape_html(&record.file_url)
            );
        }
        let _ = write!(html, " {}</li>", status_badge(record));
    }
    Fragment::new(ids::FILE_LIST, html)
}

// Only http(s) links become anchors; other schemes could run script.
fn is_web_link(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

/// Renders the welcome line.
pub fn render_welcome(email: &str) -> Fragment {
    Fragment::new(ids::MESSAGE, escape_html(&format!("Welcome, {email}")))
}

/// Renders an inline widget error in place of the widget content.
pub fn render_widget_error(element_id: &str, message: &str) -> Fragment {
    Fragment::new(
        element_id,
        format!("<p class=\"error\">{}</p>", escape_html(message)),
    )
}

#[cfg(test)]
mod tests {
    //! Unit tests for grouping and bar scaling.

    use super::*;

    #[test]
    fn groups_digits_the_indian_way() {
        assert_eq!(group_indian("1"), "1");
        assert_eq!(group_indian("999"), "999");
        assert_eq!(group_indian("1000"), "1,000");
        assert_eq!(group_indian("100000"), "1,00,000");
        assert_eq!(group_indian("1234567890"), "1,23,45,67,890");
    }

    #[test]
    fn formats_negative_and_non_finite_amounts() {
        assert_eq!(format_inr(-1234.5), "-₹1,234.50");
        assert_eq!(format_inr(f64::NAN), "₹0.00");
        assert_eq!(format_inr(-0.001), "₹0.00");
    }

    #[test]
    fn zero_maximum_renders_zero_width_bars() {
        let bars = rank_channels([("amazon", 0.0), ("jiomart", 0.0)]);
        assert!(bars.iter().all(|bar| bar.width_pct == 0.0));
        assert_eq!(bars[0].channel, "amazon");
    }

    #[test]
    fn lone_zero_channel_is_full_width() {
        let bars = rank_channels([("amazon", 0.0)]);
        assert_eq!(bars[0].width_pct, 100.0);
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }
}
