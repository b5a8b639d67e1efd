use async_trait::async_trait;

use haven_types::api::{
    ChannelFilters, ChannelQueryOptions, ChannelQueryResponse, ChannelSort, QueryChannelsOptions,
};

/// The network side of the client. Implementations talk to the chat backend;
/// the state layer only ever sees the decoded responses.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Fetches (and optionally starts watching) a single channel.
    async fn query_channel(
        &self,
        channel_type: &str,
        channel_id: &str,
        options: &ChannelQueryOptions,
    ) -> anyhow::Result<ChannelQueryResponse>;

    /// Fetches one page of the channel list.
    async fn query_channels(
        &self,
        filters: &ChannelFilters,
        sort: &ChannelSort,
        options: &QueryChannelsOptions,
    ) -> anyhow::Result<Vec<ChannelQueryResponse>>;
}
