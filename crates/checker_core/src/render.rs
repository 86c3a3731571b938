use std::fmt::Write;

use crate::checker::{CheckReport, CheckerPage, SelectionForm};
use crate::links::ResultRow;

pub const STYLESHEET: &str = include_str!("assets/style.css");
pub const SORT_SCRIPT: &str = include_str!("assets/sort.js");

pub fn render_page(page: &CheckerPage) -> String {
    let mut html = String::from(
        "<!doctype html>
<html>
<head>
<meta charset=\"utf-8\">
<link rel=\"stylesheet\" href=\"static/style.css\" type=\"text/css\">
<script src=\"static/sort.js\" defer></script>
<title>checker</title>
</head>
<body>
<div class=\"header\" id=\"main-title\"><a href=\"./\" title=\"checker\">checker</a></div>
",
    );

    match page {
        CheckerPage::Report(report) => render_report(&mut html, report),
        CheckerPage::Form(form) => render_form(&mut html, form),
        CheckerPage::Error(error) => {
            let _ = writeln!(html, "<pre>\n{}\n</pre>", escape_html(error.message()));
        }
    }

    html.push_str(
        "<div id=\"footer\">
<div id=\"meta-info\">public domain</div>
</div>
</body>
</html>
",
    );
    html
}

fn render_report(html: &mut String, report: &CheckReport) {
    let _ = writeln!(
        html,
        "<div id=\"ck-tables-wrapper\">\n<p>{} on {}</p>",
        escape_html(&report.index_title),
        escape_html(&report.db)
    );
    render_table(html, "Transcluded", &report.classification.transcluded);
    render_table(html, "Not transcluded", &report.classification.not_transcluded);
    html.push_str("</div>\n");
}

fn render_table(html: &mut String, heading: &str, rows: &[ResultRow]) {
    let _ = writeln!(
        html,
        "<h1 class=\"header\">{heading}</h1>
<table class=\"ck-results inner-table\">
<thead>
<tr>
<th class=\"header\" id=\"ck-page-column\">Page</th>
<th class=\"header\" id=\"ck-status-column\">Status</th>
</tr>
</thead>
<tbody>"
    );
    for row in rows {
        let _ = writeln!(
            html,
            "<tr>\n<td><a href=\"{}\">{}</a></td>\n<td>{}</td>\n</tr>",
            escape_html(&row.href()),
            escape_html(&row.label()),
            escape_html(row.status.as_deref().unwrap_or(""))
        );
    }
    html.push_str("</tbody>\n</table>\n");
}

fn render_form(html: &mut String, form: &SelectionForm) {
    html.push_str(
        "<form action=\"./\" method=\"get\">
<table id=\"input\" class=\"inner-table\">
<tr>
<th colspan=\"2\" class=\"header\">Input index title below.</th>
</tr>
<tr>
<th>Database</th>
<th>
<select id=\"database\" name=\"db\">
",
    );
    for database in &form.databases {
        let selected = if *database == form.selected_db {
            " selected=\"selected\""
        } else {
            ""
        };
        let escaped = escape_html(database);
        let _ = writeln!(html, "<option value=\"{escaped}\"{selected}>{escaped}</option>");
    }
    html.push_str(
        "</select>
</th>
</tr>
<tr>
<td colspan=\"2\" id=\"input-cell\">
<input id=\"title\" name=\"title\" size=\"50\" autofocus><input id=\"go-button\" type=\"submit\" value=\"Go\">
</td>
</tr>
</table>
</form>
",
    );
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}
