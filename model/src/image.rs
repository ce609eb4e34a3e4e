use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};

/// The five machine images that make up a multi-cluster ELK deployment.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageRole {
    Elasticsearch,
    Logstash,
    AppServer,
    Kibana,
    Elastalert,
}

derive_display_from_serialize!(ImageRole);
derive_fromstr_from_deserialize!(ImageRole);

impl ImageRole {
    pub const ALL: [ImageRole; 5] = [
        ImageRole::Elasticsearch,
        ImageRole::Logstash,
        ImageRole::AppServer,
        ImageRole::Kibana,
        ImageRole::Elastalert,
    ];
}

/// One value per [`ImageRole`]. Each role has its own slot, so values produced independently (e.g.
/// by concurrent builds) never share storage.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSet<T> {
    pub elasticsearch: T,
    pub logstash: T,
    pub app_server: T,
    pub kibana: T,
    pub elastalert: T,
}

impl<T> ImageSet<T> {
    /// Builds a set by calling `f` once per role.
    pub fn from_fn<F>(mut f: F) -> Self
    where
        F: FnMut(ImageRole) -> T,
    {
        Self {
            elasticsearch: f(ImageRole::Elasticsearch),
            logstash: f(ImageRole::Logstash),
            app_server: f(ImageRole::AppServer),
            kibana: f(ImageRole::Kibana),
            elastalert: f(ImageRole::Elastalert),
        }
    }

    pub fn get(&self, role: ImageRole) -> &T {
        match role {
            ImageRole::Elasticsearch => &self.elasticsearch,
            ImageRole::Logstash => &self.logstash,
            ImageRole::AppServer => &self.app_server,
            ImageRole::Kibana => &self.kibana,
            ImageRole::Elastalert => &self.elastalert,
        }
    }

    pub fn map<U, F>(self, mut f: F) -> ImageSet<U>
    where
        F: FnMut(ImageRole, T) -> U,
    {
        ImageSet {
            elasticsearch: f(ImageRole::Elasticsearch, self.elasticsearch),
            logstash: f(ImageRole::Logstash, self.logstash),
            app_server: f(ImageRole::AppServer, self.app_server),
            kibana: f(ImageRole::Kibana, self.kibana),
            elastalert: f(ImageRole::Elastalert, self.elastalert),
        }
    }

    /// Iterates over the roles and their values in [`ImageRole::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (ImageRole, &T)> {
        ImageRole::ALL.into_iter().map(move |role| (role, self.get(role)))
    }
}

/// The AMI ids produced by building all five images. A deployment may only proceed when every id
/// is non-empty.
pub type AmiSet = ImageSet<String>;

impl AmiSet {
    /// The roles whose image id is empty.
    pub fn missing(&self) -> Vec<ImageRole> {
        self.iter()
            .filter(|(_, id)| id.trim().is_empty())
            .map(|(role, _)| role)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}
