//! Response bodies for write acknowledgements.

use serde::Serialize;

#[derive(Serialize)]
pub struct MessageBody {
    pub message: String,
}

pub fn row_updated(id: &str) -> MessageBody {
    MessageBody {
        message: format!("Row {} updated successfully", id),
    }
}

pub fn row_deleted(id: &str) -> MessageBody {
    MessageBody {
        message: format!("Row {} deleted successfully", id),
    }
}

pub fn settings_updated() -> MessageBody {
    MessageBody {
        message: "Settings updated".to_string(),
    }
}
