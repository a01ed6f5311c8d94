//! 审批结果 HTML 页面

use crate::models::{format_money, ApprovalAction};
use crate::service::ApprovalReceipt;

const STYLE: &str = "body{font-family:Arial,sans-serif;max-width:600px;margin:50px auto;padding:20px;\
background:#f5f5f5}.container{background:#fff;padding:30px;border-radius:8px;\
box-shadow:0 2px 4px rgba(0,0,0,.1)}.details{background:#f9f9f9;padding:15px;border-radius:4px;\
margin:20px 0}.row{display:flex;justify-content:space-between;padding:8px 0;\
border-bottom:1px solid #eee}.label{font-weight:bold;color:#666}";

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n\
         <body>\n<div class=\"container\">\n{}\n</div>\n</body>\n</html>\n",
        escape(title),
        STYLE,
        body
    )
}

/// 审批成功页
pub fn confirmation(receipt: &ApprovalReceipt) -> String {
    let (heading, color) = match receipt.action {
        ApprovalAction::Approve => ("✓ Invoice Approved", "#28a745"),
        ApprovalAction::Reject => ("✗ Invoice Rejected", "#dc3545"),
    };
    let amount = receipt
        .amount
        .as_ref()
        .map(format_money)
        .unwrap_or_else(|| "-".to_string());

    let rows = [
        ("Invoice Number", receipt.invoice_number.clone()),
        ("Vendor", receipt.vendor_name.clone()),
        ("Amount", amount),
        ("Previous Status", receipt.previous_status.to_string()),
        ("New Status", receipt.new_status.to_string()),
        ("Action Time", receipt.decided_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
    ]
    .iter()
    .map(|(label, value)| {
        format!(
            "<div class=\"row\"><span class=\"label\">{}:</span><span>{}</span></div>",
            label,
            escape(value)
        )
    })
    .collect::<Vec<_>>()
    .join("\n");

    let body = format!(
        "<h1 style=\"color:{}\">{}</h1>\n<div class=\"details\">\n{}\n</div>\n\
         <p>The invoice has been successfully {} and the database has been updated.</p>",
        color,
        heading,
        rows,
        receipt.new_status
    );
    layout(heading, &body)
}

/// 错误页
pub fn error(message: &str) -> String {
    let body = format!(
        "<h1 style=\"color:#dc3545\">⚠ Error</h1>\n<p>{}</p>\n\
         <p>Please contact the system administrator if this problem persists.</p>",
        escape(message)
    );
    layout("Error", &body)
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
