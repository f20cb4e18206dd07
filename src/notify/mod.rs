pub mod telegram;

/// A new-topic alert handed to notification channels.
#[derive(Debug, Clone)]
pub struct TopicAlert {
    pub forum_name: String,
    pub title: String,
    pub link: String,
}
