use metrics::counter;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use seat_bridge_core::{
    extract_items, resolve_items, CatalogProduct, InjectionResult, OrderDetail, Resolution,
    SourceItem,
};
use seat_bridge_revel::{NewOrder, NewOrderDiscount, NewOrderItem, NewOrderPayment};
use seat_bridge_storage::VenueMapping;
use seat_bridge_supply::{NewSupplyOrder, SupplyClient, SupplyOrderItem};
use seat_bridge_tripleseat::{EventLineItem, EventRecord};

use crate::router::{AppState, BridgeSettings};

/// Inputs the dispatcher hands to one injection attempt.
pub struct InjectionContext<'a> {
    pub delivery_id: &'a str,
    pub event_id: i64,
    pub site_id: i64,
    pub mapping: Option<&'a VenueMapping>,
}

/// Runs the fetch, resolve, and write sequence for one event.
///
/// The create-header call is the last fatal step. Item, discount, payment,
/// activation, and supply failures degrade the order instead of aborting it:
/// the POS exposes no transaction, so a partial order beats no order.
pub async fn inject(state: &AppState, ctx: &InjectionContext<'_>) -> InjectionResult {
    let settings = state.settings();
    if !settings.enabled {
        info!(
            stage = "injector",
            delivery_id = ctx.delivery_id,
            "connector is disabled"
        );
        return InjectionResult::skipped("CONNECTOR_DISABLED");
    }

    let local_id = format!("Tripleseat {}", ctx.event_id);

    let record = match state.tripleseat().fetch_event(ctx.event_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            warn!(
                stage = "injector",
                delivery_id = ctx.delivery_id,
                event_id = ctx.event_id,
                "event no longer exists upstream"
            );
            return InjectionResult::failed("EVENT_FETCH_FAILED");
        }
        Err(err) => {
            warn!(
                stage = "injector",
                delivery_id = ctx.delivery_id,
                event_id = ctx.event_id,
                error = %err,
                "event fetch failed"
            );
            return InjectionResult::failed("EVENT_FETCH_FAILED");
        }
    };

    let Some(establishment) = resolve_establishment(settings, ctx) else {
        error!(
            stage = "injector",
            delivery_id = ctx.delivery_id,
            site_id = ctx.site_id,
            "no establishment mapped for site"
        );
        return InjectionResult::failed("NO_ESTABLISHMENT_MAPPED");
    };

    // The POS-side lookup is the authoritative dedup: the in-process key
    // cache does not survive restarts, local_id does.
    match state
        .revel()
        .find_order_by_local_id(establishment, &local_id)
        .await
    {
        Ok(Some(existing)) => {
            info!(
                stage = "injector",
                delivery_id = ctx.delivery_id,
                order_id = existing.id,
                local_id = local_id.as_str(),
                "order already exists"
            );
            return InjectionResult::skipped("ORDER_ALREADY_EXISTS");
        }
        Ok(None) => {}
        Err(err) => {
            error!(
                stage = "injector",
                delivery_id = ctx.delivery_id,
                local_id = local_id.as_str(),
                error = %err,
                "order existence check failed"
            );
            return InjectionResult::failed("ORDER_LOOKUP_FAILED");
        }
    }

    let sources = gather_source_items(state, ctx.delivery_id, &record).await;
    if sources.is_empty() {
        info!(
            stage = "resolver",
            delivery_id = ctx.delivery_id,
            event_id = ctx.event_id,
            "event carries no line items"
        );
        return InjectionResult::skipped("NO_ITEMS_RESOLVED");
    }

    let catalog = match state.revel().fetch_product_catalog(establishment).await {
        Ok(catalog) => catalog,
        Err(err) => {
            error!(
                stage = "resolver",
                delivery_id = ctx.delivery_id,
                establishment,
                error = %err,
                "product catalog fetch failed"
            );
            return InjectionResult::failed("CATALOG_FETCH_FAILED");
        }
    };
    let products: Vec<CatalogProduct> = catalog
        .iter()
        .map(|product| CatalogProduct {
            id: product.id,
            name: product.name.clone(),
            price: product.price,
        })
        .collect();

    let resolution = resolve_items(&sources, &products);
    for name in &resolution.unmatched {
        counter!("resolver_unmatched_items_total").increment(1);
        info!(
            stage = "resolver",
            delivery_id = ctx.delivery_id,
            item = name.as_str(),
            "dropped line item without a catalog match"
        );
    }
    if resolution.items.is_empty() {
        info!(
            stage = "resolver",
            delivery_id = ctx.delivery_id,
            event_id = ctx.event_id,
            "no line items resolved"
        );
        return InjectionResult::skipped("NO_ITEMS_RESOLVED");
    }

    let subtotal = resolution.subtotal();
    let invoice_total = record
        .invoice
        .as_ref()
        .and_then(|invoice| invoice.total)
        .filter(|total| *total > Decimal::ZERO);
    let discount = compute_discount(ctx.delivery_id, subtotal, invoice_total);
    let payment_amount = invoice_total.unwrap_or(subtotal);
    let total = subtotal - discount;

    let detail = OrderDetail {
        order_id: None,
        subtotal,
        discount,
        total,
        payment_type: settings.payment_type_label.clone(),
    };

    if settings.dry_run {
        info!(
            stage = "injector",
            delivery_id = ctx.delivery_id,
            local_id = local_id.as_str(),
            items = resolution.items.len(),
            subtotal = %subtotal,
            discount = %discount,
            total = %total,
            "dry run, skipping POS writes"
        );
        return InjectionResult::dry_run(detail);
    }

    let order = match state
        .revel()
        .create_order(&NewOrder {
            establishment,
            local_id: &local_id,
            created_by: settings.created_by,
            dining_option: settings.dining_option,
            notes: order_notes(&record),
            created_at: state.now(),
        })
        .await
    {
        Ok(order) => order,
        Err(err) => {
            counter!("pos_write_failures_total", "step" => "create").increment(1);
            error!(
                stage = "injector",
                delivery_id = ctx.delivery_id,
                local_id = local_id.as_str(),
                error = %err,
                "order header create failed"
            );
            return InjectionResult::failed("ORDER_CREATE_FAILED");
        }
    };
    info!(
        stage = "injector",
        delivery_id = ctx.delivery_id,
        order_id = order.id,
        items = resolution.items.len(),
        "created order header"
    );

    for item in &resolution.items {
        let request = NewOrderItem {
            order: order.id,
            product: item.product_id,
            quantity: item.quantity,
            price: item.unit_price,
        };
        if let Err(err) = state.revel().add_order_item(&request).await {
            counter!("pos_write_failures_total", "step" => "item").increment(1);
            warn!(
                stage = "injector",
                delivery_id = ctx.delivery_id,
                order_id = order.id,
                product_id = item.product_id,
                error = %err,
                "failed to add order item"
            );
        }
    }

    if discount > Decimal::ZERO {
        apply_discount(state, ctx.delivery_id, order.id, discount).await;
    }
    if payment_amount > Decimal::ZERO {
        apply_payment(state, ctx.delivery_id, order.id, payment_amount).await;
    }

    if let Err(err) = state.revel().activate_order(order.id).await {
        counter!("pos_write_failures_total", "step" => "activate").increment(1);
        warn!(
            stage = "injector",
            delivery_id = ctx.delivery_id,
            order_id = order.id,
            error = %err,
            "failed to activate order"
        );
    }

    if let Some(code) = ctx
        .mapping
        .and_then(|mapping| mapping.supply_location_code.as_deref())
    {
        if let Some(client) = state.supply() {
            feed_supply(client, ctx.delivery_id, code, &local_id, &record, &resolution).await;
        }
    }

    InjectionResult::created(OrderDetail {
        order_id: Some(order.id),
        ..detail
    })
}

fn resolve_establishment(settings: &BridgeSettings, ctx: &InjectionContext<'_>) -> Option<i64> {
    if let Some(id) = settings.establishment_override {
        return Some(id);
    }
    ctx.mapping
        .filter(|mapping| mapping.enabled)
        .map(|mapping| mapping.establishment_id)
}

/// Structured items first, the nested menu block second, the scraped
/// invoice last. Each source is only consulted when the previous one is
/// empty.
async fn gather_source_items(
    state: &AppState,
    delivery_id: &str,
    record: &EventRecord,
) -> Vec<SourceItem> {
    if !record.line_items.is_empty() {
        return record.line_items.iter().map(to_source_item).collect();
    }
    if !record.menu_items.is_empty() {
        return record.menu_items.iter().map(to_source_item).collect();
    }

    let Some(url) = record
        .invoice
        .as_ref()
        .and_then(|invoice| invoice.html_url.as_deref())
    else {
        return Vec::new();
    };
    match state.tripleseat().fetch_invoice_html(url).await {
        Ok(html) => {
            let items = extract_items(&html);
            info!(
                stage = "resolver",
                delivery_id,
                count = items.len(),
                "extracted line items from invoice"
            );
            items
        }
        Err(err) => {
            warn!(
                stage = "resolver",
                delivery_id,
                error = %err,
                "invoice fetch failed, continuing with no items"
            );
            Vec::new()
        }
    }
}

fn to_source_item(item: &EventLineItem) -> SourceItem {
    SourceItem {
        name: item.name.clone(),
        quantity: item.quantity,
        price: item.price,
    }
}

fn compute_discount(delivery_id: &str, subtotal: Decimal, invoice_total: Option<Decimal>) -> Decimal {
    match invoice_total {
        Some(total) if total < subtotal => subtotal - total,
        Some(total) if total > subtotal => {
            warn!(
                stage = "injector",
                delivery_id,
                subtotal = %subtotal,
                invoice_total = %total,
                "invoice total exceeds item subtotal, flooring discount at zero"
            );
            Decimal::ZERO
        }
        _ => Decimal::ZERO,
    }
}

async fn apply_discount(state: &AppState, delivery_id: &str, order_id: i64, amount: Decimal) {
    let Some(discount_id) = state.settings().discount_id else {
        warn!(
            stage = "injector",
            delivery_id,
            order_id,
            amount = %amount,
            "discount computed but no discount id is configured"
        );
        return;
    };
    let request = NewOrderDiscount {
        order: order_id,
        discount: discount_id,
        amount,
    };
    if let Err(err) = state.revel().apply_discount(&request).await {
        counter!("pos_write_failures_total", "step" => "discount").increment(1);
        warn!(
            stage = "injector",
            delivery_id,
            order_id,
            error = %err,
            "failed to apply discount"
        );
    }
}

async fn apply_payment(state: &AppState, delivery_id: &str, order_id: i64, amount: Decimal) {
    let Some(payment_type) = state.settings().payment_type_id else {
        warn!(
            stage = "injector",
            delivery_id,
            order_id,
            amount = %amount,
            "payment amount known but no payment type is configured"
        );
        return;
    };
    let request = NewOrderPayment {
        order: order_id,
        payment_type,
        amount,
    };
    if let Err(err) = state.revel().apply_payment(&request).await {
        counter!("pos_write_failures_total", "step" => "payment").increment(1);
        warn!(
            stage = "injector",
            delivery_id,
            order_id,
            error = %err,
            "failed to apply payment"
        );
    }
}

/// Mirrors the POS order into the supply system. Every failure in here is
/// logged and dropped; the POS order already exists.
async fn feed_supply(
    client: &SupplyClient,
    delivery_id: &str,
    code: &str,
    local_id: &str,
    record: &EventRecord,
    resolution: &Resolution,
) {
    let location = match client.find_location_by_code(code).await {
        Ok(Some(location)) => location,
        Ok(None) => {
            warn!(
                stage = "injector",
                delivery_id, code, "supply location not found"
            );
            return;
        }
        Err(err) => {
            warn!(
                stage = "injector",
                delivery_id,
                code,
                error = %err,
                "supply location lookup failed"
            );
            return;
        }
    };

    let mut items = Vec::new();
    for resolved in &resolution.items {
        match client
            .find_product_by_name(location.id, &resolved.name)
            .await
        {
            Ok(Some(product)) => items.push(SupplyOrderItem {
                product: product.id,
                quantity: resolved.quantity,
            }),
            Ok(None) => {
                info!(
                    stage = "injector",
                    delivery_id,
                    item = resolved.name.as_str(),
                    "no supply product match"
                );
            }
            Err(err) => {
                warn!(
                    stage = "injector",
                    delivery_id,
                    item = resolved.name.as_str(),
                    error = %err,
                    "supply product lookup failed"
                );
            }
        }
    }
    if items.is_empty() {
        info!(
            stage = "injector",
            delivery_id, "no supply products matched, skipping supply order"
        );
        return;
    }

    let request = NewSupplyOrder {
        location: location.id,
        external_ref: local_id,
        notes: record.name.clone().unwrap_or_default(),
        items,
    };
    match client.create_order(&request).await {
        Ok(order_id) => {
            info!(
                stage = "injector",
                delivery_id, supply_order_id = order_id, "created supply order"
            );
        }
        Err(err) => {
            warn!(
                stage = "injector",
                delivery_id,
                error = %err,
                "supply order create failed"
            );
        }
    }
}

fn order_notes(record: &EventRecord) -> String {
    let mut parts = Vec::new();
    if let Some(name) = record.name.as_deref() {
        parts.push(name.to_string());
    }
    if let Some(contact) = record.contact_name.as_deref() {
        parts.push(format!("Contact: {contact}"));
    }
    if let Some(guests) = record.guest_count {
        parts.push(format!("Guests: {guests}"));
    }
    parts.join(" | ")
}
