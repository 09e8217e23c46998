use core::fmt;
use kernel::FileFilter;
use url::Url;

const SEP: char = '/';
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

#[derive(Clone)]
pub struct Resource {
    url: Url,
}

impl Resource {
    #[must_use]
    pub fn new(uri: &str) -> Option<Resource> {
        let url = Url::parse(uri).ok()?;
        if url.cannot_be_a_base() {
            return None;
        }
        Some(Resource { url })
    }

    /// Appends `/`-separated segments, percent-encoding each one.
    pub fn append_path(&mut self, path: &str) -> &mut Self {
        if let Ok(mut segments) = self.url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(path.split(SEP).filter(|x| !x.is_empty()));
        }
        self
    }

    /// Appends one segment, escaping any `/` inside it.
    pub fn append_segment(&mut self, segment: &str) -> &mut Self {
        if let Ok(mut segments) = self.url.path_segments_mut() {
            segments.pop_if_empty().push(segment);
        }
        self
    }

    pub fn append_filter(&mut self, filter: &FileFilter) -> &mut Self {
        if filter.is_empty() {
            return self;
        }
        let mut pairs = self.url.query_pairs_mut();
        if let Some(name) = &filter.name {
            pairs.append_pair("name", name);
        }
        if let Some(kind) = &filter.kind {
            pairs.append_pair("type", kind);
        }
        if let Some(size) = filter.min_size {
            pairs.append_pair("min_size", &size.to_string());
        }
        if let Some(size) = filter.max_size {
            pairs.append_pair("max_size", &size.to_string());
        }
        if let Some(date) = filter.start_date {
            pairs.append_pair("start_date", &date.format(DATE_FORMAT).to_string());
        }
        if let Some(date) = filter.end_date {
            pairs.append_pair("end_date", &date.format(DATE_FORMAT).to_string());
        }
        if let Some(order) = filter.ordering {
            pairs.append_pair("ordering", order.as_str());
        }
        drop(pairs);
        self
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
