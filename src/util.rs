// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime, Utc};

use crate::param::reason_phrase;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

pub struct HtmlBuilder {
    title: String,
    css: String,
    body: String,
}

/// 目录列表中的一项
#[derive(Debug, Clone)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl HtmlBuilder {
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let title = format!("{} {}", code, reason_phrase(code));
        let css = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
        .to_string();
        let description = note.unwrap_or_else(|| reason_phrase(code));
        let body = format!(
            r"
            <h1>{}</h1>
            <p>{}</p>
            ",
            code,
            escape_html(description)
        );
        Self { title, css, body }
    }

    pub fn from_dir(path: &str, entries: &mut [ListingEntry]) -> Self {
        sort_dir_entries(entries);

        let shown = path.trim_end_matches('/');
        let mut body = String::new();
        body.push_str(&format!("<h1>{}/ 的文件列表</h1><hr>", escape_html(shown)));
        body.push_str("<table>");
        body.push_str(
            r#"
            <tr>
                <td>文件名</td>
                <td>大小</td>
                <td>修改时间</td>
            </tr>
            <tr>
                <td><a href="../">..</a></td>
                <td></td>
                <td></td>
            </tr>
            "#,
        );
        for entry in entries.iter() {
            let formatted_time = entry.modified.map_or(String::from("-"), |modified| {
                let local_time: DateTime<Local> = modified.into();
                local_time.format("%Y-%m-%d %H:%M:%S %Z").to_string()
            });
            let name = escape_html(&entry.name);
            if entry.is_dir {
                body.push_str(&format!(
                    r#"
                    <tr>
                        <td><a href="{0}/">{0}/</a></td>
                        <td>文件夹</td>
                        <td>{1}</td>
                    </tr>
                    "#,
                    name, formatted_time
                ));
            } else {
                body.push_str(&format!(
                    r#"
                    <tr>
                        <td><a href="{0}">{0}</a></td>
                        <td>{1}</td>
                        <td>{2}</td>
                    </tr>
                    "#,
                    name,
                    format_file_size(entry.size),
                    formatted_time
                ));
            }
        }
        body.push_str("</table>");
        let css = r"
            table {
                border-collapse: collapse;
                width: 100%;
            }

            td {
                padding: 8px;
                white-space: pre-wrap;
                border: none;
            }"
        .to_string();
        HtmlBuilder {
            title: format!("{}/ 的文件列表", shown),
            css,
            body,
        }
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
            <html>
                <head>
                    <meta charset="utf-8">
                    <title>{}</title>
                    <style>{}</style>
                </head>
                <body>
                {}
                </body>
            </html>"##,
            escape_html(&self.title),
            self.css,
            self.body
        )
    }
}

pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}

// 目录在前，同类按名称排序
fn sort_dir_entries(entries: &mut [ListingEntry]) {
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
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

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn decode_bytes(input: &str, plus_as_space: bool) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                        continue;
                    }
                    _ => out.push(b'%'),
                }
            }
            b'+' if plus_as_space => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }
    out
}

/// 路径的百分号解码。解码结果不是合法 UTF-8 时返回 `None`，非法的 `%` 序列原样保留。
pub fn percent_decode(input: &str) -> Option<String> {
    String::from_utf8(decode_bytes(input, false)).ok()
}

/// `application/x-www-form-urlencoded` 解码：`+` 表示空格，非法 UTF-8 以替换字符代替。
pub fn form_decode(input: &str) -> String {
    String::from_utf8_lossy(&decode_bytes(input, true)).into_owned()
}

/// IMF-fixdate 格式，例如 `Sun, 06 Nov 1994 08:49:37 GMT`。
pub fn http_date(time: SystemTime) -> String {
    let time: DateTime<Utc> = time.into();
    time.format(HTTP_DATE_FORMAT).to_string()
}

pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), HTTP_DATE_FORMAT).ok()?;
    Some(naive.and_utc().into())
}
