use anyhow::{Context, Result};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use common::Rgba;

/// Fallback coordinate-space width when the root element carries no viewBox.
const DEFAULT_VIEWBOX_WIDTH: f32 = 100.0;

/// Rewrites a customisation SVG: the root `<svg>` element's `fill` becomes
/// the 6-digit form of `color` (replacing any fill already present), and
/// `flipped` mirrors the whole drawing horizontally by wrapping its content
/// in a transform group.
pub fn customize_snake_svg(svg: &str, color: Rgba, flipped: bool) -> Result<String> {
    let fill = color.hex6();
    let mut reader = Reader::from_str(svg);
    let mut writer = Writer::new(Vec::new());

    let mut root_seen = false;
    let mut depth = 0usize;
    let mut flip_open = false;

    loop {
        match reader.read_event().context("failed to decode SVG token")? {
            Event::Start(e) => {
                depth += 1;
                if !root_seen && e.local_name().as_ref() == b"svg" {
                    root_seen = true;
                    let viewbox_width = viewbox_width(&e);
                    writer.write_event(Event::Start(with_fill(&e, &fill)?))?;
                    if flipped {
                        let mut group = BytesStart::new("g");
                        group.push_attribute((
                            "transform",
                            format!("scale(-1, 1) translate(-{viewbox_width}, 0)").as_str(),
                        ));
                        writer.write_event(Event::Start(group))?;
                        flip_open = true;
                    }
                } else {
                    writer.write_event(Event::Start(e))?;
                }
            }
            Event::End(e) => {
                if depth == 1 && flip_open {
                    writer.write_event(Event::End(BytesEnd::new("g")))?;
                    flip_open = false;
                }
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e))?;
            }
            Event::Empty(e) => {
                if !root_seen && e.local_name().as_ref() == b"svg" {
                    root_seen = true;
                    writer.write_event(Event::Empty(with_fill(&e, &fill)?))?;
                } else {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }

    String::from_utf8(writer.into_inner()).context("customised SVG is not valid UTF-8")
}

fn with_fill(element: &BytesStart<'_>, fill: &str) -> Result<BytesStart<'static>> {
    let mut out = element.to_owned();
    out.clear_attributes();
    for attr in element.attributes().with_checks(false) {
        let attr = attr.context("malformed SVG attribute")?;
        if attr.key.as_ref() != b"fill" {
            out.push_attribute(attr);
        }
    }
    out.push_attribute(("fill", fill));
    Ok(out)
}

fn viewbox_width(element: &BytesStart<'_>) -> f32 {
    element
        .try_get_attribute("viewBox")
        .ok()
        .flatten()
        .and_then(|attr| {
            let value = String::from_utf8_lossy(&attr.value).into_owned();
            value
                .split_whitespace()
                .nth(2)
                .and_then(|w| w.parse::<f32>().ok())
        })
        .unwrap_or(DEFAULT_VIEWBOX_WIDTH)
}

/// Strips the outer `<svg …>` / `</svg>` pair so the drawing can be embedded
/// inside another SVG document. Input without a root element passes through.
pub fn strip_root_element(svg: &str) -> String {
    let s = svg.trim();
    let Some(open_at) = s.find("<svg") else {
        return s.to_string();
    };
    let Some(open_len) = s[open_at..].find('>') else {
        return s.to_string();
    };
    let inner_start = open_at + open_len + 1;
    let inner_end = match s.rfind("</svg>") {
        Some(at) if at >= inner_start => at,
        _ => return String::new(),
    };
    s[inner_start..inner_end].trim().to_string()
}
