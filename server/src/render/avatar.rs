use crate::media::svg::strip_root_element;

/// Nothing larger than 10000x10000.
const MAX_AVATAR_EDGE: i32 = 9999;

#[derive(Debug, thiserror::Error)]
#[error("invalid avatar settings")]
pub struct InvalidAvatarSettings;

/// Inputs for the avatar compositor: a tail on the left (mirrored), a solid
/// body rectangle, and a head on the right, all in the requested colour.
#[derive(Debug, Clone, Default)]
pub struct AvatarSettings {
    pub width: i32,
    pub height: i32,
    pub head_svg: Option<String>,
    pub tail_svg: Option<String>,
    pub color: Option<String>,
}

impl AvatarSettings {
    /// The head and tail each take a height-sized square; the body fills
    /// whatever width is left.
    pub fn body_width(&self) -> i32 {
        self.width - 2 * self.height
    }

    fn head_offset(&self) -> i32 {
        self.width - self.height
    }

    pub fn is_valid(&self) -> bool {
        if self.width > MAX_AVATAR_EDGE || self.height > MAX_AVATAR_EDGE {
            return false;
        }
        if self.width < 1 || self.height < 1 {
            return false;
        }
        self.body_width() >= 0
    }
}

/// Composes the avatar SVG document. The fetched head/tail SVGs are embedded
/// with their root elements stripped so they inherit the avatar's fill.
pub fn avatar_svg(settings: &AvatarSettings) -> Result<String, InvalidAvatarSettings> {
    if !settings.is_valid() {
        return Err(InvalidAvatarSettings);
    }

    let width = settings.width;
    let height = settings.height;
    let body_width = settings.body_width();
    let head_offset = settings.head_offset();
    let color = settings.color.as_deref().unwrap_or("#000000");
    let head = settings
        .head_svg
        .as_deref()
        .map(strip_root_element)
        .unwrap_or_default();
    let tail = settings
        .tail_svg
        .as_deref()
        .map(strip_root_element)
        .unwrap_or_default();

    Ok(format!(
        r##"<svg id="root" xmlns="http://www.w3.org/2000/svg" fill="{color}" width="{width}" height="{height}">
<g transform="scale(-1, 1) translate(-{height}, 0)">
	<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100" width="{height}" height="{height}">
		{tail}
	</svg>
</g>
<g transform="translate({height}, 0)">
	<rect width="{body_width}" height="{height}" />
</g>
<g transform="translate({head_offset}, 0)">
	<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100" width="{height}" height="{height}">
		{head}
	</svg>
</g>
</svg>"##
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(width: i32, height: i32) -> AvatarSettings {
        AvatarSettings {
            width,
            height,
            head_svg: Some(r#"<svg viewBox="0 0 100 100"><path d="M0 0h1"/></svg>"#.to_string()),
            tail_svg: Some(r#"<svg viewBox="0 0 100 100"><path d="M9 9h1"/></svg>"#.to_string()),
            color: Some("#3b194d".to_string()),
        }
    }

    #[test]
    fn rejects_a_body_that_would_be_negative() {
        // 100 wide with 60-tall ends leaves no room for a body
        assert!(!settings(100, 60).is_valid());
        assert!(settings(120, 60).is_valid());
        assert!(settings(120, 60).body_width() == 0);
    }

    #[test]
    fn rejects_oversized_avatars() {
        assert!(!settings(10000, 100).is_valid());
        assert!(!settings(500, 10000).is_valid());
        assert!(settings(9999, 100).is_valid());
    }

    #[test]
    fn composes_tail_body_and_head() {
        let svg = avatar_svg(&settings(500, 100)).unwrap();
        assert!(svg.contains(r##"fill="#3b194d""##));
        // body rectangle spans the middle 300
        assert!(svg.contains(r#"<rect width="300" height="100" />"#));
        // head shifted to the right edge, tail mirrored on the left
        assert!(svg.contains("translate(400, 0)"));
        assert!(svg.contains("scale(-1, 1) translate(-100, 0)"));
        // embedded pieces lost their root elements
        assert!(svg.contains(r#"<path d="M0 0h1"/>"#));
        assert!(svg.contains(r#"<path d="M9 9h1"/>"#));
        assert_eq!(svg.matches("<svg").count(), 3);
    }

    #[test]
    fn invalid_settings_yield_an_error() {
        assert!(avatar_svg(&settings(50, 100)).is_err());
    }
}
