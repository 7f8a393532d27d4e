use crate::domain::market::{ChartPoint, ChartSeries, ChartTrend, PriceSnapshot, PriceStatus};
use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use scraper::{ElementRef, Html, Selector};

pub const DEFAULT_PERIOD: &str = "1mo";

/// Daily candles requested per chart period; unknown periods get a month.
pub fn chart_count(period: &str) -> u32 {
    match period {
        "3mo" => 90,
        "6mo" => 180,
        "1y" => 365,
        _ => 30,
    }
}

fn selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("invalid selector {css:?}: {e:?}"))
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn first_text(doc: &Html, css: &str) -> anyhow::Result<Option<String>> {
    Ok(doc.select(&selector(css)?).next().map(text_of))
}

/// Scrapes the quote summary block. Missing fields stay `None`; only the status falls back to
/// flat.
pub fn parse_quote_page(company_code: &str, html: &str) -> anyhow::Result<PriceSnapshot> {
    let doc = Html::parse_document(html);

    let current_price = first_text(&doc, "div.rate_info div.today p.no_today span.blind")?
        .and_then(|s| s.replace(',', "").parse::<i64>().ok());

    let exday = selector("div.rate_info div.today p.no_exday em span.blind")?;
    let mut exday_values = doc.select(&exday).map(text_of);
    let change_value = exday_values.next().map(|s| s.replace(',', ""));
    let change_rate = exday_values.next();

    let volume = first_text(&doc, "div.rate_info table tbody tr:nth-child(3) td span.blind")?
        .map(|s| s.replace(',', ""));
    let market_cap = first_text(&doc, "#_market_sum")?.map(|s| s.replace(['\t', '\n'], ""));

    let rising = doc
        .select(&selector("div.rate_info div.today p.no_exday em.no_up")?)
        .next()
        .is_some();
    let falling = doc
        .select(&selector("div.rate_info div.today p.no_exday em.no_down")?)
        .next()
        .is_some();
    let status = if rising {
        PriceStatus::Rising
    } else if falling {
        PriceStatus::Falling
    } else {
        PriceStatus::Flat
    };

    Ok(PriceSnapshot {
        company_code: company_code.to_string(),
        current_price,
        change_value,
        change_rate,
        volume,
        market_cap,
        status,
    })
}

fn parse_point(data: &str) -> Option<ChartPoint> {
    let parts: Vec<&str> = data.split('|').map(str::trim).collect();
    if parts.len() < 6 {
        return None;
    }
    let date = NaiveDate::parse_from_str(parts[0], "%Y%m%d").ok()?;
    let num = |s: &str| s.parse::<f64>().unwrap_or(0.0);

    Some(ChartPoint {
        date,
        open: num(parts[1]),
        high: num(parts[2]),
        low: num(parts[3]),
        close: num(parts[4]),
        volume: parts[5].parse::<i64>().unwrap_or(0),
    })
}

/// Reads `<item data="YYYYMMDD|open|high|low|close|volume"/>` rows, sorted by date.
pub fn parse_chart_xml(company_code: &str, period: &str, xml: &str) -> anyhow::Result<ChartSeries> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut points = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.name().as_ref() == b"item" => {
                let data = e
                    .try_get_attribute("data")
                    .ok()
                    .flatten()
                    .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()));
                match data.as_deref().and_then(parse_point) {
                    Some(p) => points.push(p),
                    None => tracing::debug!(company_code, ?data, "skipping unreadable chart item"),
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(anyhow::anyhow!(
                    "chart XML error at position {}: {err}",
                    reader.buffer_position()
                ))
            }
            _ => (),
        }
    }

    points.sort_by_key(|p| p.date);
    let trend = ChartTrend::from_points(&points);
    Ok(ChartSeries {
        company_code: company_code.to_string(),
        period: period.to_string(),
        points,
        trend,
    })
}
