//! Selector table for the comparison site's markup.
//!
//! The markup is an external contract that changes without notice; when the
//! site is redesigned only this table should need updating.

use crate::browser::Locator;

/// A collapsible filter box in the filter bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPanel {
    /// Clickable title that expands the box.
    pub disclosure: String,
    /// Container whose children are the selectable options.
    pub options: String,
}

impl FilterPanel {
    fn at(filter_bar: &str, child: u32) -> Self {
        let boxed = format!("{filter_bar} > div.sr-filterBar__content > div:nth-child({child})");
        Self {
            disclosure: format!("{boxed} > div.sr-boxTitle.sr-boxTitle--clickable > svg"),
            options: format!(
                "{boxed} > div.sr-filterBox__content.sr-filterBox__content--titled > div > div > div > div"
            ),
        }
    }

    pub fn disclosure(&self) -> Locator {
        Locator::page(&self.disclosure)
    }

    /// Link of the option at 1-based `position`.
    pub fn option(&self, position: u32) -> Locator {
        Locator::page(format!("{} > div:nth-child({position}) > a", self.options))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLayout {
    pub consent_frame: String,
    pub consent_accept: String,
    pub search_input: String,
    pub search_submit: String,
    /// Present once a search result page has rendered.
    pub results_page: String,
    /// Reveals the filter bar.
    pub filter_toggle: String,
    pub width_filter: FilterPanel,
    pub depth_filter: FilterPanel,
    pub filter_submit: String,
    pub result_list: String,
    pub result_item: String,
    /// Relative to a result item.
    pub item_title: String,
    /// Relative to a result item.
    pub item_price: String,
    /// Relative to a result item.
    pub item_link: String,
}

impl SiteLayout {
    pub fn idealo() -> Self {
        let content = "#productcategory > main > div.row.resultlist__content > div > div";
        let filter_bar = format!("{content} > section > div.sr-filterBar");
        let result_list =
            format!("{content} > section > div.sr-searchResult__resultPanel > div:nth-child(2) > div");

        Self {
            consent_frame: r#"iframe[id^="sp_message_iframe"]"#.to_string(),
            consent_accept: "#notice > div.message-component.message-row.mobile-reverse > div.message-component.message-column.container-accept-all > button".to_string(),
            search_input: r#"input[type="search"]"#.to_string(),
            search_submit: "#i-header-search > button.i-search-button.i-search-button--submit".to_string(),
            results_page: "#productcategory".to_string(),
            filter_toggle: format!(
                "{content} > div > div.sr-topBar__titleToggleWrapper > div.sr-topBar__titleToggleWrapper--mobileFilterToggle > button"
            ),
            width_filter: FilterPanel::at(&filter_bar, 11),
            depth_filter: FilterPanel::at(&filter_bar, 8),
            filter_submit: format!("{filter_bar} > div.sr-filterBar__footer > button"),
            result_item: format!("{result_list} > div"),
            result_list,
            item_title: "div > div > a > div.sr-resultItemTile__infoWrapper > div.sr-resultItemTile__summary > div > div.sr-productSummary__title".to_string(),
            item_price: "div > div > a > div.sr-detailedPriceInfo.detailedPriceInfo--GRID > div.sr-detailedPriceInfo__price".to_string(),
            item_link: "div > div a".to_string(),
        }
    }

    pub fn consent_frame(&self) -> Locator {
        Locator::page(&self.consent_frame)
    }

    pub fn consent_accept(&self) -> Locator {
        Locator::in_frame(&self.consent_frame, &self.consent_accept)
    }
}

impl Default for SiteLayout {
    fn default() -> Self {
        Self::idealo()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_locator_uses_the_position() {
        let layout = SiteLayout::idealo();
        let option = layout.width_filter.option(2);
        assert!(option.frame.is_none());
        assert!(option.selector.contains("div:nth-child(11)"));
        assert!(option.selector.ends_with("> div:nth-child(2) > a"));
    }

    #[test]
    fn width_and_depth_panels_are_distinct() {
        let layout = SiteLayout::idealo();
        assert_ne!(layout.width_filter, layout.depth_filter);
        assert!(layout.depth_filter.disclosure.contains("div:nth-child(8)"));
    }

    #[test]
    fn result_items_are_children_of_the_list() {
        let layout = SiteLayout::idealo();
        assert_eq!(layout.result_item, format!("{} > div", layout.result_list));
    }

    #[test]
    fn consent_button_is_scoped_to_its_frame() {
        let layout = SiteLayout::idealo();
        assert_eq!(
            layout.consent_accept().frame.as_deref(),
            Some(layout.consent_frame.as_str())
        );
    }
}
