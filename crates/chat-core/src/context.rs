use chrono::NaiveDate;

use crate::commerce::{
    CartSnapshot, CommerceDirectory, DirectoryError, Identity, OrderSnapshot, format_money,
};

pub const NOT_LOGGED_IN_MARKER: &str = "User is not logged in.";
pub const MAX_RECENT_ORDERS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    Authenticated(Identity),
}

impl Caller {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(identity) => Some(identity.user_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLineSummary {
    pub quantity: u32,
    pub product_name: String,
    pub subtotal_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSummary {
    pub lines: Vec<CartLineSummary>,
    pub total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSummary {
    pub id: i64,
    pub status: String,
    pub total_cents: i64,
    pub placed_on: NaiveDate,
}

/// What the assistant knows about an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileNote {
    Extracted { filename: String, text: String },
    Unreadable { filename: String, reason: String },
}

/// Per-request snapshot of the caller's storefront state. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationContext {
    pub display_name: Option<String>,
    pub cart: Option<CartSummary>,
    pub recent_orders: Vec<OrderSummary>,
    pub file_note: Option<FileNote>,
}

impl ConversationContext {
    pub fn anonymous() -> Self {
        Self {
            display_name: None,
            cart: None,
            recent_orders: Vec::new(),
            file_note: None,
        }
    }

    pub fn with_file_note(mut self, file_note: Option<FileNote>) -> Self {
        self.file_note = file_note;
        self
    }

    pub fn render(&self) -> String {
        let mut rendered = self.render_account();
        if let Some(file_note) = &self.file_note {
            rendered.push('\n');
            rendered.push_str(&render_file_note(file_note));
        }
        rendered
    }

    fn render_account(&self) -> String {
        let Some(display_name) = &self.display_name else {
            return NOT_LOGGED_IN_MARKER.to_string();
        };

        let mut lines = vec![format!("User: {display_name}")];

        match &self.cart {
            Some(cart) if !cart.lines.is_empty() => {
                lines.push("Current Cart:".to_string());
                lines.extend(cart.lines.iter().map(|line| {
                    format!(
                        "- {}x {} (${})",
                        line.quantity,
                        line.product_name,
                        format_money(line.subtotal_cents)
                    )
                }));
                lines.push(format!("Cart Total: ${}", format_money(cart.total_cents)));
            }
            _ => lines.push("Current Cart: Empty".to_string()),
        }

        if self.recent_orders.is_empty() {
            lines.push("Recent Orders: None".to_string());
        } else {
            lines.push("Recent Orders:".to_string());
            lines.extend(self.recent_orders.iter().map(|order| {
                format!(
                    "- Order #{}: {} (${}) - {}",
                    order.id,
                    order.status,
                    format_money(order.total_cents),
                    order.placed_on.format("%Y-%m-%d")
                )
            }));
        }

        lines.join("\n")
    }
}

fn render_file_note(file_note: &FileNote) -> String {
    match file_note {
        FileNote::Extracted { filename, text } => {
            format!("Uploaded File Content:\n[{filename}]\n{text}")
        }
        FileNote::Unreadable { filename, reason } => format!(
            "The user uploaded '{filename}', but its text could not be extracted ({reason}). \
             Let the user know and answer from the message alone."
        ),
    }
}

pub fn assemble_conversation_context(
    caller: &Caller,
    cart: Option<&CartSnapshot>,
    orders: &[OrderSnapshot],
) -> ConversationContext {
    let Caller::Authenticated(identity) = caller else {
        return ConversationContext::anonymous();
    };

    let cart = cart.map(|cart| CartSummary {
        lines: cart
            .lines
            .iter()
            .map(|line| CartLineSummary {
                quantity: line.quantity,
                product_name: line.product_name.clone(),
                subtotal_cents: line.subtotal_cents(),
            })
            .collect(),
        total_cents: cart.total_cents(),
    });

    let mut recent_orders = orders.to_vec();
    recent_orders.sort_by(|left, right| {
        right
            .created_at
            .cmp(&left.created_at)
            .then_with(|| right.id.cmp(&left.id))
    });

    ConversationContext {
        display_name: Some(identity.display_name().to_string()),
        cart,
        recent_orders: recent_orders
            .into_iter()
            .take(MAX_RECENT_ORDERS)
            .map(|order| OrderSummary {
                id: order.id,
                status: order.status,
                total_cents: order.total_cents,
                placed_on: order.created_at.date_naive(),
            })
            .collect(),
        file_note: None,
    }
}

/// Fetches the caller's cart and orders; anonymous callers cost no lookups.
pub async fn build_conversation_context(
    caller: &Caller,
    directory: &dyn CommerceDirectory,
) -> Result<ConversationContext, DirectoryError> {
    let Some(user_id) = caller.user_id() else {
        return Ok(ConversationContext::anonymous());
    };

    let cart = directory.cart_for_user(user_id).await?;
    let orders = directory.recent_orders(user_id, MAX_RECENT_ORDERS).await?;
    Ok(assemble_conversation_context(caller, cart.as_ref(), &orders))
}
