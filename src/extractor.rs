use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::models::Product;

// Every group is scoped under the same result card ancestor.
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.a-section.a-spacing-base h2 span.a-color-base.a-text-normal").unwrap()
});
static PRICE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"div.a-section.a-spacing-base span.a-price[data-a-color="base"] span.a-offscreen"#).unwrap()
});
static PICTURE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.a-section.a-spacing-base img.s-image[srcset]").unwrap());

/// The three independently queried columns of a results page.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProductColumns {
    pub titles: Vec<String>,
    pub prices: Vec<String>,
    pub pictures: Vec<String>,
}

impl ProductColumns {
    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);

        let titles = document
            .select(&TITLE_SELECTOR)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .collect();
        let prices = document
            .select(&PRICE_SELECTOR)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .collect();
        let pictures = document
            .select(&PICTURE_SELECTOR)
            .map(|el| el.value().attr("src").unwrap_or_default().trim().to_string())
            .collect();

        Self {
            titles,
            prices,
            pictures,
        }
    }

    /// Pairs the columns by index.
    ///
    /// Row `i` is emitted only when title, price and picture at `i` are all
    /// present and non-empty. The columns are not correlated beyond their
    /// position: if the page yields different counts for each, rows past the
    /// first gap are paired with the wrong neighbours. That is a property of
    /// the markup and is left as is.
    pub fn into_products(self) -> impl Iterator<Item = Product> {
        let ProductColumns {
            titles,
            prices,
            pictures,
        } = self;

        titles
            .into_iter()
            .enumerate()
            .filter_map(move |(i, title)| {
                let price = prices.get(i).filter(|p| !p.is_empty())?;
                let picture = pictures.get(i).filter(|p| !p.is_empty())?;
                if title.is_empty() {
                    return None;
                }
                Some(Product {
                    title,
                    price: price.clone(),
                    picture: picture.clone(),
                })
            })
    }
}

/// Lazily yields the complete product rows found in a search results page.
pub fn extract_products(html: &str) -> impl Iterator<Item = Product> {
    let columns = ProductColumns::from_html(html);
    tracing::debug!(
        titles = columns.titles.len(),
        prices = columns.prices.len(),
        pictures = columns.pictures.len(),
        "queried product columns"
    );
    columns.into_products()
}
