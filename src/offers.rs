// Offer negotiation over plain chat text. There is no structured offer
// entity server-side: a message IS an offer when its content matches the
// conventions below, and state updates travel as messages with structured
// metadata. All pattern matching lives in this module so the conventions
// can be swapped for a real schema without touching anything else.

use crate::api::ApiClient;
use crate::error::{ChatError, Result};
use crate::models::{Message, ProductRef};
use crate::storage::CheckoutLedger;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Cue phrase that marks a message as an offer proposal (matched
/// case-insensitively, together with a dollar amount).
pub const OFFER_CUE: &str = "make an offer";

/// Fixed marker the seller side embeds when accepting an offer.
pub const ACCEPTED_MARKER: &str = "✅ Offer accepted!";

/// Literal prefix in front of an embedded order reference token.
pub const ORDER_REF_PREFIX: &str = "Order reference: ";

static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$(\d+(?:\.\d{1,2})?)").unwrap());

static PRICE_IN_PARENS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\$\d+(?:\.\d{1,2})?\)").unwrap());

/// What a message's text makes it, per the recognition rules.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    Plain,
    OfferProposal { amount: String },
    OfferAccepted { order_reference: Option<String> },
    ProductInquiry,
}

/// Everything the classifier needs to know beyond the text itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyContext {
    /// Is this the first message of its conversation?
    pub is_first_message: bool,
    /// Does the conversation carry an attached product?
    pub has_attached_product: bool,
}

/// Extract the dollar amount from an offer proposal, e.g.
/// `"💰 I'd like to make an offer: $45.50"` → `Some("45.50")`. Returns
/// `None` when no `$<number>` is present; callers must surface that as an
/// error, never treat it as zero.
pub fn extract_offer_amount(text: &str) -> Option<String> {
    AMOUNT_RE
        .captures(text)
        .map(|caps| caps[1].to_string())
}

/// Like [`extract_offer_amount`] but with the hard-error contract applied.
pub fn require_offer_amount(text: &str) -> Result<String> {
    extract_offer_amount(text).ok_or(ChatError::OfferAmount)
}

/// Pull the order reference out of an acceptance notice, when present. The
/// token runs from the literal prefix to the next whitespace.
pub fn extract_order_reference(text: &str) -> Option<String> {
    let start = text.find(ORDER_REF_PREFIX)? + ORDER_REF_PREFIX.len();
    let token: String = text[start..]
        .chars()
        .take_while(|c| !c.is_whitespace())
        .collect();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Bare greetings never count as product inquiries, even with a product
/// attached. Keeps a product card from rendering on every "hi".
fn is_bare_greeting(text: &str) -> bool {
    let trimmed = text
        .trim()
        .trim_end_matches(['!', '.', '?'])
        .to_lowercase();
    matches!(trimmed.as_str(), "hi" | "hello" | "hey")
}

/// The single entry point for message classification (recognition rules for
/// offers, acceptances and product inquiries).
pub fn classify_message(text: &str, ctx: &ClassifyContext) -> MessageKind {
    if text.contains(ACCEPTED_MARKER) {
        return MessageKind::OfferAccepted {
            order_reference: extract_order_reference(text),
        };
    }

    let lowered = text.to_lowercase();
    if lowered.contains(OFFER_CUE) {
        if let Some(amount) = extract_offer_amount(text) {
            return MessageKind::OfferProposal { amount };
        }
        // Cue phrase with no parseable amount is a malformed offer, not a
        // plain message; the caller decides how loudly to complain.
    }

    let has_inquiry_keywords = lowered.contains("interested in") && lowered.contains("product");
    if has_inquiry_keywords && PRICE_IN_PARENS_RE.is_match(text) {
        return MessageKind::ProductInquiry;
    }
    if ctx.is_first_message && ctx.has_attached_product && !is_bare_greeting(text) {
        return MessageKind::ProductInquiry;
    }

    MessageKind::Plain
}

/// Compose the conventional offer proposal body.
pub fn compose_offer(amount: &str) -> String {
    format!("💰 I'd like to make an offer: ${}", amount)
}

/// Compose the conventional acceptance notice.
pub fn compose_acceptance(order_reference: Option<&str>) -> String {
    match order_reference {
        Some(reference) => format!("{} {}{}", ACCEPTED_MARKER, ORDER_REF_PREFIX, reference),
        None => ACCEPTED_MARKER.to_string(),
    }
}

/// Compose the first-contact product inquiry body. Shares its format with
/// the classifier's price-in-parentheses rule.
pub fn compose_product_inquiry(product: &ProductRef) -> String {
    format!(
        "Hi! I'm interested in your product \"{}\" (${:.2})",
        product.title, product.price
    )
}

/// Per-offer negotiation state, keyed by the proposing message's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
}

impl OfferStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OfferStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Declined => "declined",
        }
    }

    pub fn parse(value: &str) -> Option<OfferStatus> {
        match value {
            "pending" => Some(OfferStatus::Pending),
            "accepted" => Some(OfferStatus::Accepted),
            "declined" => Some(OfferStatus::Declined),
            _ => None,
        }
    }
}

/// Side map of offer statuses for the open conversation. Terminal states
/// are sticky for the life of the session; a fresh load re-derives them
/// from whatever status-update messages the history contains.
#[derive(Debug, Default)]
pub struct OfferBoard {
    statuses: HashMap<String, OfferStatus>,
}

impl OfferBoard {
    pub fn new() -> Self {
        OfferBoard::default()
    }

    /// Current status of the offer proposed in `message_id`. Unknown ids
    /// are pending: a proposal with no recorded resolution awaits one.
    pub fn status(&self, message_id: &str) -> OfferStatus {
        self.statuses
            .get(message_id)
            .copied()
            .unwrap_or(OfferStatus::Pending)
    }

    /// Record a status for an offer. Accepted/declined are terminal: a
    /// later conflicting update is dropped.
    pub fn apply(&mut self, message_id: &str, status: OfferStatus) {
        match self.statuses.get(message_id) {
            Some(existing) if existing.is_terminal() && *existing != status => {
                warn!(
                    "Ignoring offer status change {} -> {} for message {}",
                    existing.as_str(),
                    status.as_str(),
                    message_id
                );
            }
            _ => {
                self.statuses.insert(message_id.to_string(), status);
            }
        }
    }

    /// Fold an offer-status-update message into the board. Non-update
    /// messages and updates without a target id are ignored.
    pub fn note_message(&mut self, message: &Message) {
        let Some(meta) = message.metadata.as_ref() else {
            return;
        };
        if !meta.offer_status_update {
            return;
        }
        let (Some(offer_id), Some(status_str)) = (&meta.original_offer_id, &meta.status) else {
            warn!(
                "Offer status update {} missing originalOfferId or status",
                message.id
            );
            return;
        };
        match OfferStatus::parse(status_str) {
            Some(status) => self.apply(offer_id, status),
            None => warn!(
                "Offer status update {} carries unknown status '{}'",
                message.id, status_str
            ),
        }
    }

    pub fn clear(&mut self) {
        self.statuses.clear();
    }
}

/// Resolve a pending offer. The status-update call goes out first; the
/// local terminal transition happens only after the server confirms, so a
/// network failure leaves the offer actionable.
pub async fn respond_to_offer(
    api: &ApiClient,
    board: &mut OfferBoard,
    conversation_id: &str,
    message_id: &str,
    status: OfferStatus,
) -> Result<()> {
    if !status.is_terminal() {
        return Err(ChatError::Protocol(
            "offer response must be accepted or declined".to_string(),
        ));
    }
    if board.status(message_id).is_terminal() {
        return Err(ChatError::Protocol(format!(
            "offer {} is already resolved",
            message_id
        )));
    }

    api.update_offer_status(conversation_id, message_id, status.as_str())
        .await?;
    board.apply(message_id, status);
    info!("Offer {} marked {}", message_id, status.as_str());
    Ok(())
}

/// Result of a checkout attempt for an accepted offer.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutOutcome {
    /// First initiation from this message; the caller should hand off to
    /// the checkout flow with the extracted order reference.
    Initiated { order_reference: Option<String> },
    /// Checkout already ran for this message id (possibly before a reload).
    AlreadyInitiated,
}

/// Initiate checkout for the acceptance message `message`. Idempotent per
/// message id: the durable ledger records every initiation, so a second
/// click or a stale re-render cannot start the flow twice.
pub fn begin_checkout(
    ledger: &mut dyn CheckoutLedger,
    message: &Message,
) -> Result<CheckoutOutcome> {
    if ledger.has_completed(&message.id) {
        info!("Checkout already initiated for message {}", message.id);
        return Ok(CheckoutOutcome::AlreadyInitiated);
    }

    ledger.mark_completed(&message.id)?;
    Ok(CheckoutOutcome::Initiated {
        order_reference: extract_order_reference(&message.content),
    })
}
